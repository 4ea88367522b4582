use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::datetime::due_date_serde;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ValueEnum,
)]
pub enum Priority {
    #[serde(alias = "高")]
    High,
    #[default]
    #[serde(alias = "中")]
    Medium,
    #[serde(alias = "低")]
    Low,
}

impl Priority {
    /// Sort weight; higher means more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// Matches a free-text label exactly (after trimming), in either the
    /// English or the legacy Japanese spelling.
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "High" | "high" | "HIGH" | "高" => Some(Priority::High),
            "Medium" | "medium" | "MEDIUM" | "中" => Some(Priority::Medium),
            "Low" | "low" | "LOW" | "低" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::from_label(s).ok_or_else(|| anyhow!("unknown priority: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl Subtask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank_as_none"
    )]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "due_date_serde")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Subtask>,
}

impl Task {
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            due_date: draft.due_date,
            completed: false,
            created_at: now,
            tags: draft.tags,
            subtasks: draft.subtasks,
        }
    }

    /// Case-insensitive substring match on the title or the description.
    pub fn mentions(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle_lower)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle_lower))
    }

    /// Same cleanup as [`TaskDraft::normalized`], so what is kept in memory
    /// reads back unchanged from storage.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = clean_description(self.description);
        self.tags = clean_tags(self.tags);
        self
    }

    pub fn completed_subtasks(&self) -> usize {
        self.subtasks.iter().filter(|s| s.completed).count()
    }

    /// Short form of the id as shown in listings.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// The editable fields of a task, as submitted by the editor form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Trims the title, drops a blank description and blank or repeated tags.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = clean_description(self.description);
        self.tags = clean_tags(self.tags);
        self
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            due_date: task.due_date,
            tags: task.tags.clone(),
            subtasks: task.subtasks.clone(),
        }
    }
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn clean_tags(raw: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn reads_legacy_record_with_blank_fields() {
        let raw = r#"{
            "id": "a1",
            "title": "Buy milk",
            "description": "",
            "priority": "高",
            "dueDate": "",
            "completed": false,
            "createdAt": "2024-05-01T09:30:00.000Z",
            "tags": [],
            "subtasks": [{"id": "s1", "text": "find wallet", "completed": true}]
        }"#;

        let task: Task = serde_json::from_str(raw).expect("parse legacy task");
        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(
            task.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).single().expect("ts")
        );
        assert_eq!(task.subtasks.len(), 1);
        assert!(task.subtasks[0].completed);
    }

    #[test]
    fn writes_camel_case_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).single().expect("ts");
        let mut draft = TaskDraft::new("File taxes");
        draft.due_date = NaiveDate::from_ymd_opt(2024, 4, 15);
        let task = Task::from_draft(draft, now);

        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["dueDate"], "2024-04-15");
        assert_eq!(value["priority"], "Medium");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn priority_labels() {
        assert_eq!(Priority::from_label(" High\n"), Some(Priority::High));
        assert_eq!(Priority::from_label("低"), Some(Priority::Low));
        assert_eq!(Priority::from_label("urgent"), None);
        assert!("nope".parse::<Priority>().is_err());
        assert!(Priority::High.rank() > Priority::Medium.rank());
    }

    #[test]
    fn draft_normalization() {
        let mut draft = TaskDraft::new("  Plan trip  ");
        draft.description = Some("   ".to_string());
        draft.tags = vec!["travel".into(), " ".into(), "travel".into(), "2024".into()];
        let draft = draft.normalized();
        assert_eq!(draft.title, "Plan trip");
        assert_eq!(draft.description, None);
        assert_eq!(draft.tags, vec!["travel".to_string(), "2024".to_string()]);
    }

    #[test]
    fn search_matches_description_case_insensitively() {
        let now = Utc::now();
        let mut draft = TaskDraft::new("Groceries");
        draft.description = Some("Oat MILK and bread".to_string());
        let task = Task::from_draft(draft, now);
        assert!(task.mentions("milk"));
        assert!(task.mentions("groc"));
        assert!(task.mentions(""));
        assert!(!task.mentions("cheese"));
    }
}
