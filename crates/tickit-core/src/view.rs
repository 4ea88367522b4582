use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  ValueEnum,
)]
pub enum StatusFilter {
  #[default]
  All,
  Completed,
  Incomplete
}

impl StatusFilter {
  fn admits(
    self,
    task: &Task
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Completed => {
        task.completed
      }
      | StatusFilter::Incomplete => {
        !task.completed
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  ValueEnum,
)]
pub enum PriorityFilter {
  #[default]
  All,
  High,
  Medium,
  Low
}

impl PriorityFilter {
  fn admits(
    self,
    task: &Task
  ) -> bool {
    match self {
      | PriorityFilter::All => true,
      | PriorityFilter::High => {
        task.priority == Priority::High
      }
      | PriorityFilter::Medium => {
        task.priority
          == Priority::Medium
      }
      | PriorityFilter::Low => {
        task.priority == Priority::Low
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  ValueEnum,
)]
pub enum SortMode {
  #[default]
  CreatedDesc,
  CreatedAsc,
  DueAsc,
  PriorityDesc
}

impl SortMode {
  fn compare(
    self,
    a: &Task,
    b: &Task
  ) -> Ordering {
    match self {
      | SortMode::CreatedDesc => {
        b.created_at.cmp(&a.created_at)
      }
      | SortMode::CreatedAsc => {
        a.created_at.cmp(&b.created_at)
      }
      // Undated tasks go last.
      | SortMode::DueAsc => {
        match (a.due_date, b.due_date) {
          | (Some(x), Some(y)) => {
            x.cmp(&y)
          }
          | (Some(_), None) => {
            Ordering::Less
          }
          | (None, Some(_)) => {
            Ordering::Greater
          }
          | (None, None) => {
            Ordering::Equal
          }
        }
      }
      | SortMode::PriorityDesc => {
        b.priority
          .rank()
          .cmp(&a.priority.rank())
      }
    }
  }
}

/// Criteria for the derived view.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct ViewQuery {
  pub status:   StatusFilter,
  pub priority: PriorityFilter,
  pub sort:     SortMode,
  #[serde(default)]
  pub search:   String,
  #[serde(default)]
  pub tag:      Option<String>
}

impl ViewQuery {
  /// True iff the task passes every
  /// predicate.
  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    let needle =
      self.search.trim().to_lowercase();
    self.matches_with_needle(
      task, &needle
    )
  }

  fn matches_with_needle(
    &self,
    task: &Task,
    needle: &str
  ) -> bool {
    if !self.status.admits(task) {
      return false;
    }
    if !self.priority.admits(task) {
      return false;
    }
    if !task.mentions(needle) {
      return false;
    }
    if let Some(tag) =
      self.tag.as_deref()
      && !task.tags.iter().any(|t| {
        t.eq_ignore_ascii_case(tag)
      })
    {
      return false;
    }
    true
  }
}

/// Filters and orders `tasks` without
/// touching the input. The sort is
/// stable, so ties keep collection
/// order.
#[tracing::instrument(
  skip(tasks),
  fields(total = tasks.len())
)]
pub fn derive_view<'a>(
  tasks: &'a [Task],
  query: &ViewQuery
) -> Vec<&'a Task> {
  let needle =
    query.search.trim().to_lowercase();
  let mut view: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      query.matches_with_needle(
        task, &needle
      )
    })
    .collect();

  view.sort_by(|a, b| {
    query.sort.compare(a, b)
  });

  trace!(
    shown = view.len(),
    "derived view"
  );
  view
}
