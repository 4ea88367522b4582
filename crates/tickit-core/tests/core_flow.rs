use std::fs;

use tempfile::tempdir;
use tickit_core::advisor::Advisor;
use tickit_core::controller::Controller;
use tickit_core::store::{FileStore, KeyValueStore, TASKS_KEY, TaskRepository};
use tickit_core::task::{Priority, TaskDraft};
use tickit_core::view::{PriorityFilter, SortMode, StatusFilter, ViewQuery};

fn file_repo(dir: &std::path::Path) -> TaskRepository {
    TaskRepository::new(Box::new(FileStore::open(dir).expect("open store")))
}

#[test]
fn tasks_survive_a_restart() {
    let temp = tempdir().expect("tempdir");

    let mut ctl = Controller::open(file_repo(temp.path()), Advisor::disabled());
    let mut draft = TaskDraft::new("Buy milk");
    draft.priority = Priority::High;
    draft.tags = vec!["home".to_string()];
    let milk = ctl.create(draft).expect("create");
    let report = ctl.create(TaskDraft::new("Write report")).expect("create");
    ctl.set_completed(&report.id, true).expect("complete");
    drop(ctl);

    let reopened = Controller::open(file_repo(temp.path()), Advisor::disabled());
    assert_eq!(reopened.tasks().len(), 2);
    assert_eq!(reopened.tasks()[0].id, report.id);
    assert!(reopened.tasks()[0].completed);
    assert_eq!(reopened.get(&milk.id).expect("milk").tags, vec!["home"]);

    let query = ViewQuery {
        status: StatusFilter::Incomplete,
        priority: PriorityFilter::High,
        sort: SortMode::PriorityDesc,
        ..ViewQuery::default()
    };
    let view = reopened.view(&query);
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].title, "Buy milk");
}

#[test]
fn empty_directory_loads_nothing() {
    let temp = tempdir().expect("tempdir");
    let repo = file_repo(temp.path());
    assert!(repo.try_load().expect("load").is_empty());
}

#[test]
fn stored_document_uses_camel_case_keys() {
    let temp = tempdir().expect("tempdir");
    let mut ctl = Controller::open(file_repo(temp.path()), Advisor::disabled());
    ctl.create(TaskDraft::new("Plan trip")).expect("create");

    let raw = fs::read_to_string(temp.path().join(format!("{TASKS_KEY}.json"))).expect("read");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let first = &doc[0];
    assert_eq!(first["title"], "Plan trip");
    assert_eq!(first["completed"], false);
    assert!(first.get("createdAt").is_some());
    assert_eq!(first["priority"], "Medium");
}

#[test]
fn unreadable_data_starts_empty_and_is_kept_aside() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    store.set(TASKS_KEY, "{not json").expect("seed");

    let ctl = Controller::open(file_repo(temp.path()), Advisor::disabled());
    assert!(ctl.tasks().is_empty());

    let kept = store
        .get(&format!("{TASKS_KEY}.corrupt"))
        .expect("get")
        .expect("copy kept");
    assert_eq!(kept, "{not json");
}

#[test]
fn update_keeps_identity_and_unknown_delete_is_ignored() {
    let temp = tempdir().expect("tempdir");
    let mut ctl = Controller::open(file_repo(temp.path()), Advisor::disabled());
    let task = ctl.create(TaskDraft::new("Dentist")).expect("create");

    let mut changed = task.clone();
    changed.title = "Dentist at 3pm".to_string();
    changed.created_at = chrono::Utc::now() + chrono::Duration::days(3);
    let updated = ctl.update(changed).expect("update").expect("known id");
    assert_eq!(updated.created_at, task.created_at);
    assert_eq!(updated.title, "Dentist at 3pm");

    let mut stranger = task.clone();
    stranger.id = "not-a-task".to_string();
    assert_eq!(ctl.update(stranger).expect("update"), None);

    assert!(ctl.delete("not-a-task").is_none());
    assert_eq!(ctl.tasks().len(), 1);
}

#[test]
fn reloaded_collection_equals_memory_after_edits() {
    let temp = tempdir().expect("tempdir");
    let mut ctl = Controller::open(file_repo(temp.path()), Advisor::disabled());
    let mut draft = TaskDraft::new("Taxes");
    draft.description = Some("gather receipts".to_string());
    draft.due_date = chrono::NaiveDate::from_ymd_opt(2025, 4, 15);
    let taxes = ctl.create(draft).expect("create");
    let gym = ctl.create(TaskDraft::new("Gym")).expect("create");
    ctl.add_subtask(&taxes.id, "find forms").expect("subtask");

    let mut changed = ctl.get(&taxes.id).expect("taxes").clone();
    changed.description = Some("  ".to_string());
    changed.tags = vec![" money ".to_string(), String::new(), "money".to_string()];
    ctl.update(changed).expect("update").expect("known id");
    ctl.set_completed(&gym.id, true).expect("complete");

    let in_memory = ctl.tasks().to_vec();
    drop(ctl);

    let reloaded = Controller::open(file_repo(temp.path()), Advisor::disabled());
    assert_eq!(reloaded.tasks(), in_memory.as_slice());
    assert_eq!(in_memory[1].description, None);
    assert_eq!(in_memory[1].tags, vec!["money"]);
}
