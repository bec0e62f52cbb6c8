use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use taskflow_core::clock::{Clock, ManualClock};
use taskflow_core::storage::{DEFAULT_STORAGE_KEY, FileStorage, StorageGateway};
use taskflow_core::store::TaskStore;
use taskflow_core::task::{Priority, Task, TaskDraft, TaskPatch};
use taskflow_core::view::{SortKey, StatusFilter, select};
use tempfile::tempdir;

fn clock() -> Rc<ManualClock> {
    Rc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ))
}

#[test]
fn file_store_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let clock = clock();

    let task_id = {
        let storage = FileStorage::open(temp.path()).expect("open storage");
        let mut store =
            TaskStore::open(storage, DEFAULT_STORAGE_KEY, clock.clone()).expect("open store");
        let category = store
            .add_category(taskflow_core::category::CategoryDraft::new("Garden"))
            .expect("add category");
        let task = store
            .add_task(
                TaskDraft::new("Plant tulips")
                    .category(category.id.clone())
                    .priority(Priority::High)
                    .deadline(clock.now() + Duration::days(3))
                    .tag("spring"),
            )
            .expect("add task");
        store.set_sort(SortKey::Deadline).expect("set sort");
        task.id
    };

    let storage = FileStorage::open(temp.path()).expect("reopen storage");
    let raw = storage
        .get(DEFAULT_STORAGE_KEY)
        .expect("read blob")
        .expect("blob present");
    assert!(raw.contains("\"sortBy\":\"deadline\""));
    assert!(raw.contains("\"categoryId\""));

    let store = TaskStore::open(storage, DEFAULT_STORAGE_KEY, clock).expect("reopen store");
    let task = store.task(&task_id).expect("task restored");
    assert_eq!(task.title, "Plant tulips");
    assert_eq!(task.tags, vec!["spring"]);
    assert_eq!(store.categories().len(), 4);
    assert_eq!(store.view().sort, SortKey::Deadline);
}

#[test]
fn unreadable_file_falls_back_to_defaults() {
    let temp = tempdir().expect("tempdir");
    let mut storage = FileStorage::open(temp.path()).expect("open storage");
    storage
        .set(DEFAULT_STORAGE_KEY, "{\"tasks\": [oops")
        .expect("write garbage");

    let store = TaskStore::open(storage, DEFAULT_STORAGE_KEY, clock()).expect("open store");
    assert!(store.tasks().is_empty());
    assert_eq!(store.categories().len(), 3);
}

#[test]
fn task_set_tracks_adds_updates_and_deletes() {
    let temp = tempdir().expect("tempdir");
    let clock = clock();
    let storage = FileStorage::open(temp.path()).expect("open storage");
    let mut store = TaskStore::open(storage, DEFAULT_STORAGE_KEY, clock.clone()).expect("open");

    let mut expected: BTreeMap<String, String> = BTreeMap::new();
    for step in 0..12 {
        clock.advance(Duration::minutes(1));
        let task = store
            .add_task(TaskDraft::new(format!("task {step}")))
            .expect("add");
        expected.insert(task.id.clone(), task.title.clone());

        if step % 3 == 1 {
            let title = format!("renamed {step}");
            store
                .update_task(
                    &task.id,
                    TaskPatch {
                        title: Some(title.clone()),
                        ..TaskPatch::default()
                    },
                )
                .expect("update");
            expected.insert(task.id.clone(), title);
        }
        if step % 4 == 3 {
            let victim = expected.keys().next().cloned().expect("some task");
            store.delete_task(&victim).expect("delete");
            expected.remove(&victim);
        }
    }

    let actual: BTreeMap<String, String> = store
        .tasks()
        .iter()
        .map(|t| (t.id.clone(), t.title.clone()))
        .collect();
    assert_eq!(actual, expected);
}

#[test]
fn deleting_categories_never_leaves_dangling_tasks() {
    let clock = clock();
    let temp = tempdir().expect("tempdir");
    let storage = FileStorage::open(temp.path()).expect("open storage");
    let mut store = TaskStore::open(storage, DEFAULT_STORAGE_KEY, clock).expect("open");

    for (title, category) in [("a", "work"), ("b", "work"), ("c", "shopping"), ("d", "personal")] {
        store
            .add_task(TaskDraft::new(title).category(category))
            .expect("add");
    }

    let removal = store.delete_category("work").expect("delete work");
    assert_eq!(removal.reassigned_to, "personal");
    assert_eq!(removal.moved_tasks.len(), 2);

    store.delete_category("personal").expect("delete personal");
    let refused = store.delete_category("shopping");
    assert!(refused.is_err());

    let ids: Vec<&str> = store.categories().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["shopping"]);
    assert!(store.tasks().iter().all(|t| t.category_id == "shopping"));
}

#[test]
fn select_is_idempotent_and_orders_by_priority_then_position() {
    let clock = clock();
    let temp = tempdir().expect("tempdir");
    let storage = FileStorage::open(temp.path()).expect("open storage");
    let mut store = TaskStore::open(storage, DEFAULT_STORAGE_KEY, clock.clone()).expect("open");

    let priorities = [
        Priority::Low,
        Priority::High,
        Priority::Medium,
        Priority::High,
        Priority::Low,
        Priority::Medium,
    ];
    for (idx, priority) in priorities.into_iter().enumerate() {
        let mut draft = TaskDraft::new(format!("t{idx}")).priority(priority);
        if idx % 2 == 0 {
            draft = draft.deadline(clock.now() + Duration::hours(idx as i64 + 1));
        }
        store.add_task(draft).expect("add");
    }

    let titles = |tasks: Vec<&Task>| -> Vec<String> {
        tasks.iter().map(|t| t.title.clone()).collect()
    };

    let by_priority = select(store.tasks(), "", StatusFilter::All, None, SortKey::Priority);
    let again = select(store.tasks(), "", StatusFilter::All, None, SortKey::Priority);
    assert_eq!(titles(by_priority.clone()), titles(again));
    assert_eq!(
        titles(by_priority),
        vec!["t1", "t3", "t2", "t5", "t0", "t4"]
    );

    let by_deadline = select(store.tasks(), "", StatusFilter::All, None, SortKey::Deadline);
    let first_undated = by_deadline
        .iter()
        .position(|t| t.deadline.is_none())
        .expect("undated task present");
    assert!(by_deadline[first_undated..].iter().all(|t| t.deadline.is_none()));
}
