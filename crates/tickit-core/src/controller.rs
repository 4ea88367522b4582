use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::advisor::{Advisor, AdvisorError};
use crate::state::{AppState, TaskError};
use crate::store::TaskRepository;
use crate::task::{Priority, Task, TaskDraft};
use crate::view::{ViewQuery, derive_view};

pub const DEFAULT_CELEBRATION: Duration = Duration::from_secs(5);
pub const CELEBRATION_PENDING: &str = "Generating a message for you...";

/// Owns the application state and writes the collection back after every
/// committed change.
#[derive(Debug)]
pub struct Controller {
    state: AppState,
    repo: TaskRepository,
    advisor: Advisor,
    celebration_ttl: Duration,
}

impl Controller {
    /// Loads the stored collection once.
    #[instrument(skip_all)]
    pub fn open(repo: TaskRepository, advisor: Advisor) -> Self {
        let tasks = repo.load();
        info!(count = tasks.len(), ai = advisor.is_enabled(), "controller ready");
        Self {
            state: AppState::with_tasks(tasks),
            repo,
            advisor,
            celebration_ttl: DEFAULT_CELEBRATION,
        }
    }

    pub fn with_celebration_ttl(mut self, ttl: Duration) -> Self {
        self.celebration_ttl = ttl;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn tasks(&self) -> &[Task] {
        self.state.tasks()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.state.get(id)
    }

    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    pub fn view(&self, query: &ViewQuery) -> Vec<&Task> {
        derive_view(self.state.tasks(), query)
    }

    pub fn resolve_id(&self, prefix: &str) -> Result<String, TaskError> {
        self.state.resolve_id(prefix)
    }

    fn commit(&self) {
        self.repo.save(self.state.tasks());
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create(&mut self, draft: TaskDraft) -> Result<Task, TaskError> {
        let task = self.state.insert(draft, Utc::now())?.clone();
        self.state.close_dialogs();
        self.commit();
        info!(id = %task.id, "task created");
        Ok(task)
    }

    /// Replace-by-id; see [`AppState::replace`].
    #[instrument(skip(self, task), fields(id = %task.id))]
    pub fn update(&mut self, task: Task) -> Result<Option<Task>, TaskError> {
        let updated = self.state.replace(task)?.cloned();
        self.finish_edit(updated)
    }

    #[instrument(skip(self, draft))]
    pub fn edit(&mut self, id: &str, draft: TaskDraft) -> Result<Option<Task>, TaskError> {
        let updated = self.state.apply_draft(id, draft)?.cloned();
        self.finish_edit(updated)
    }

    fn finish_edit(&mut self, updated: Option<Task>) -> Result<Option<Task>, TaskError> {
        match updated {
            Some(task) => {
                self.state.close_dialogs();
                self.commit();
                debug!(id = %task.id, "task updated");
                Ok(Some(task))
            }
            None => {
                warn!("update for unknown task ignored");
                Ok(None)
            }
        }
    }

    /// Sets the flag and persists. Returns true when the task went from open
    /// to completed.
    #[instrument(skip(self))]
    pub fn set_completed(&mut self, id: &str, completed: bool) -> Result<bool, TaskError> {
        let previous = self
            .state
            .set_completed(id, completed)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        self.commit();
        Ok(completed && !previous)
    }

    /// Fetches a motivational message and shows it for the configured time.
    #[instrument(skip(self))]
    pub async fn celebrate(&mut self) -> String {
        self.state
            .celebrate(CELEBRATION_PENDING.to_string(), Instant::now(), None);
        let message = self.advisor.motivational_message().await;
        self.state
            .celebrate(message.clone(), Instant::now(), Some(self.celebration_ttl));
        message
    }

    /// Commits the toggle before the advisor is asked anything. Returns the
    /// celebration shown, if any.
    #[instrument(skip(self))]
    pub async fn toggle_complete(
        &mut self,
        id: &str,
        completed: bool,
    ) -> Result<Option<String>, TaskError> {
        if self.set_completed(id, completed)? {
            Ok(Some(self.celebrate().await))
        } else {
            Ok(None)
        }
    }

    pub fn celebration(&self) -> Option<&str> {
        self.state.celebration(Instant::now())
    }

    /// Removing an unknown id is a no-op.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: &str) -> Option<Task> {
        let removed = self.state.remove(id);
        match removed.as_ref() {
            Some(task) => {
                self.commit();
                info!(id = %task.id, "task deleted");
            }
            None => debug!("delete for unknown task ignored"),
        }
        removed
    }

    pub fn open_create(&mut self) {
        self.state.open_editor(None);
    }

    pub fn open_edit(&mut self, id: &str) -> Result<(), TaskError> {
        let id = self.state.resolve_id(id)?;
        self.state.open_editor(Some(id));
        Ok(())
    }

    pub fn request_delete(&mut self, id: &str) -> Result<&Task, TaskError> {
        let id = self.state.resolve_id(id)?;
        self.state.request_delete(id.clone());
        self.state
            .get(&id)
            .ok_or(TaskError::NotFound(id))
    }

    /// Deletes the task awaiting confirmation, if any.
    pub fn confirm_delete(&mut self) -> Option<Task> {
        let id = self.state.pending_delete()?.to_string();
        self.state.close_dialogs();
        self.delete(&id)
    }

    pub fn cancel(&mut self) {
        self.state.close_dialogs();
    }

    pub async fn suggest_priority(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Priority, AdvisorError> {
        self.advisor.suggest_priority(title, description).await
    }

    /// Asks the advisor for a priority and stores it on the task.
    #[instrument(skip(self))]
    pub async fn apply_suggested_priority(&mut self, id: &str) -> anyhow::Result<Priority> {
        let task = self
            .state
            .get(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?
            .clone();
        let priority = self
            .advisor
            .suggest_priority(&task.title, task.description.as_deref())
            .await?;

        let mut updated = task;
        updated.priority = priority;
        self.update(updated)?;
        Ok(priority)
    }

    /// Asks the advisor for subtasks and appends them to the task. Returns
    /// how many were added.
    #[instrument(skip(self))]
    pub async fn breakdown(&mut self, id: &str) -> anyhow::Result<usize> {
        let title = self
            .state
            .get(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?
            .title
            .clone();
        let generated = self.advisor.generate_subtasks(&title).await?;
        let added = self
            .state
            .append_subtasks(id, generated)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        self.commit();
        info!(added, "subtasks generated");
        Ok(added)
    }

    pub fn add_subtask(&mut self, id: &str, text: &str) -> Result<usize, TaskError> {
        let added = self
            .state
            .append_subtasks(id, [text])
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        if added > 0 {
            self.commit();
        }
        Ok(added)
    }

    /// Flips a subtask and persists, like any other edit.
    #[instrument(skip(self))]
    pub fn toggle_subtask(&mut self, id: &str, subtask_id: &str) -> Result<bool, TaskError> {
        let now_done = self.state.toggle_subtask(id, subtask_id)?;
        self.commit();
        Ok(now_done)
    }

    pub fn remove_subtask(&mut self, id: &str, subtask_id: &str) -> Result<String, TaskError> {
        let removed = self.state.remove_subtask(id, subtask_id)?;
        self.commit();
        Ok(removed.text)
    }
}
