use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::task::{Subtask, Task, TaskDraft};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("a task needs a non-empty title")]
    EmptyTitle,

    #[error("no task matches id {0}")]
    NotFound(String),

    #[error("id prefix {prefix} matches {count} entries; type more characters")]
    AmbiguousId { prefix: String, count: usize },
}

/// Which dialog, if any, is in front. The variants are exclusive, so
/// opening one closes the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    Idle,
    /// Editor open; `None` is a blank form for a new task.
    Editing(Option<String>),
    ConfirmDelete(String),
}

/// A transient message that stops showing once `expires_at` passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Celebration {
    pub message: String,
    pub expires_at: Option<Instant>,
}

impl Celebration {
    pub fn is_visible(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// The canonical task collection plus UI selection. Every method is a pure
/// transition; persisting the result is the caller's job.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    tasks: Vec<Task>,
    pub selection: Selection,
    celebration: Option<Celebration>,
}

impl AppState {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Exact id match first, then a unique prefix.
    pub fn resolve_id(&self, prefix: &str) -> Result<String, TaskError> {
        match_id(self.tasks.iter().map(|t| t.id.as_str()), prefix).map(str::to_string)
    }

    /// Builds the task and puts it first in the collection.
    pub fn insert(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Result<&Task, TaskError> {
        let draft = draft.normalized();
        if draft.title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }

        let mut task = Task::from_draft(draft, now);
        while self.get(&task.id).is_some() {
            task.id = uuid::Uuid::new_v4().to_string();
        }
        debug!(id = %task.id, "inserting task");
        self.tasks.insert(0, task);
        Ok(&self.tasks[0])
    }

    /// Replace-by-id. The stored id and creation time win over whatever the
    /// incoming value carries. Returns `None` when no task has that id.
    pub fn replace(&mut self, incoming: Task) -> Result<Option<&Task>, TaskError> {
        let mut incoming = incoming.normalized();
        if incoming.title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }
        let Some(slot) = self.get_mut(&incoming.id) else {
            return Ok(None);
        };
        incoming.created_at = slot.created_at;
        incoming.id = slot.id.clone();
        *slot = incoming;
        Ok(Some(&*slot))
    }

    /// Applies a draft on top of the stored task, keeping identity and the
    /// completion flag.
    pub fn apply_draft(&mut self, id: &str, draft: TaskDraft) -> Result<Option<&Task>, TaskError> {
        let Some(current) = self.get(id) else {
            return Ok(None);
        };
        let draft = draft.normalized();
        let updated = Task {
            id: current.id.clone(),
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            due_date: draft.due_date,
            completed: current.completed,
            created_at: current.created_at,
            tags: draft.tags,
            subtasks: draft.subtasks,
        };
        self.replace(updated)
    }

    /// Returns the previous flag, or `None` when the id is unknown.
    pub fn set_completed(&mut self, id: &str, completed: bool) -> Option<bool> {
        let task = self.get_mut(id)?;
        let previous = task.completed;
        task.completed = completed;
        Some(previous)
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        if self.selection == Selection::ConfirmDelete(id.to_string())
            || self.selection == Selection::Editing(Some(id.to_string()))
        {
            self.selection = Selection::Idle;
        }
        Some(self.tasks.remove(idx))
    }

    /// Appends subtasks built from `texts`; blank entries are skipped.
    /// Returns how many were added, or `None` when the task is unknown.
    pub fn append_subtasks<I, S>(&mut self, id: &str, texts: I) -> Option<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let task = self.get_mut(id)?;
        let before = task.subtasks.len();
        for text in texts {
            let text: String = text.into();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let mut subtask = Subtask::new(text);
            while task.subtasks.iter().any(|s| s.id == subtask.id) {
                subtask = Subtask::new(text);
            }
            task.subtasks.push(subtask);
        }
        Some(task.subtasks.len() - before)
    }

    /// Flips one subtask; returns its new state. `subtask_id` may be a
    /// unique prefix.
    pub fn toggle_subtask(&mut self, id: &str, subtask_id: &str) -> Result<bool, TaskError> {
        let task = self
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let idx = subtask_index(task, subtask_id)?;
        let subtask = &mut task.subtasks[idx];
        subtask.completed = !subtask.completed;
        Ok(subtask.completed)
    }

    pub fn remove_subtask(&mut self, id: &str, subtask_id: &str) -> Result<Subtask, TaskError> {
        let task = self
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        let idx = subtask_index(task, subtask_id)?;
        Ok(task.subtasks.remove(idx))
    }

    pub fn open_editor(&mut self, target: Option<String>) {
        self.selection = Selection::Editing(target);
    }

    pub fn request_delete(&mut self, id: String) {
        self.selection = Selection::ConfirmDelete(id);
    }

    pub fn close_dialogs(&mut self) {
        self.selection = Selection::Idle;
    }

    pub fn editing_target(&self) -> Option<&str> {
        match &self.selection {
            Selection::Editing(target) => target.as_deref(),
            _ => None,
        }
    }

    pub fn pending_delete(&self) -> Option<&str> {
        match &self.selection {
            Selection::ConfirmDelete(id) => Some(id),
            _ => None,
        }
    }

    /// Shows `message` until `now + ttl`; a `None` ttl keeps it until
    /// replaced.
    pub fn celebrate(&mut self, message: String, now: Instant, ttl: Option<Duration>) {
        self.celebration = Some(Celebration {
            message,
            expires_at: ttl.map(|ttl| now + ttl),
        });
    }

    pub fn celebration(&self, now: Instant) -> Option<&str> {
        self.celebration
            .as_ref()
            .filter(|c| c.is_visible(now))
            .map(|c| c.message.as_str())
    }

}

/// Resolves `prefix` against `ids`: an exact match wins, otherwise the
/// prefix must select exactly one id. A blank prefix matches nothing.
fn match_id<'a, I>(ids: I, prefix: &str) -> Result<&'a str, TaskError>
where
    I: Iterator<Item = &'a str> + Clone,
{
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(TaskError::NotFound(String::new()));
    }
    if let Some(exact) = ids.clone().find(|id| *id == prefix) {
        return Ok(exact);
    }

    let matches: Vec<&str> = ids.filter(|id| id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => Err(TaskError::NotFound(prefix.to_string())),
        [only] => Ok(*only),
        many => Err(TaskError::AmbiguousId {
            prefix: prefix.to_string(),
            count: many.len(),
        }),
    }
}

fn subtask_index(task: &Task, subtask_id: &str) -> Result<usize, TaskError> {
    let id = match_id(task.subtasks.iter().map(|s| s.id.as_str()), subtask_id)?;
    task.subtasks
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| TaskError::NotFound(subtask_id.to_string()))
}
