use std::rc::Rc;

use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::category::{
  Category,
  CategoryDraft,
  CategoryPatch,
  CategoryRemoval,
  DEFAULT_COLOR
};
use crate::clock::Clock;
use crate::error::{
  Result,
  TaskflowError
};
use crate::storage::{
  Snapshot,
  StorageGateway
};
use crate::task::{
  Task,
  TaskDraft,
  TaskPatch,
  new_id,
  normalise_tags,
  normalise_text
};
use crate::view::{
  SortKey,
  Stats,
  StatusFilter,
  Theme,
  ViewState
};

pub const LAST_CATEGORY_MESSAGE: &str =
  "You must have at least one category.";

/// Owner of the task and category collections.
///
/// Every mutating call persists the whole snapshot through the
/// gateway before returning. Mutations are applied to a copy that only
/// becomes live once the write succeeded, so a refused or failed call
/// leaves the store exactly as it was.
pub struct TaskStore<S> {
  gateway: S,
  key:     String,
  clock:   Rc<dyn Clock>,
  state:   Snapshot
}

impl<S: StorageGateway> TaskStore<S> {
  #[instrument(skip(gateway, clock))]
  pub fn open(
    gateway: S,
    key: &str,
    clock: Rc<dyn Clock>
  ) -> Result<Self> {
    let raw = gateway
      .get(key)
      .map_err(TaskflowError::Storage)?;
    let state = Snapshot::load_or_default(
      raw.as_deref(),
      clock.now()
    );

    info!(
      key,
      tasks = state.tasks.len(),
      categories = state.categories.len(),
      "opened task store"
    );

    Ok(Self {
      gateway,
      key: key.to_string(),
      clock,
      state
    })
  }

  /// Starts from the default state without reading the gateway; for
  /// hosts whose storage failed to open.
  pub fn fresh(
    gateway: S,
    key: &str,
    clock: Rc<dyn Clock>
  ) -> Self {
    let state = Snapshot::fresh(clock.now());
    Self {
      gateway,
      key: key.to_string(),
      clock,
      state
    }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  pub fn clock(&self) -> Rc<dyn Clock> {
    Rc::clone(&self.clock)
  }

  pub fn gateway(&self) -> &S {
    &self.gateway
  }

  pub fn tasks(&self) -> &[Task] {
    &self.state.tasks
  }

  pub fn categories(&self) -> &[Category] {
    &self.state.categories
  }

  pub fn view(&self) -> &ViewState {
    &self.state.view
  }

  pub fn snapshot(&self) -> &Snapshot {
    &self.state
  }

  pub fn task(
    &self,
    id: &str
  ) -> Option<&Task> {
    self
      .state
      .tasks
      .iter()
      .find(|t| t.id == id)
  }

  pub fn category(
    &self,
    id: &str
  ) -> Option<&Category> {
    self
      .state
      .categories
      .iter()
      .find(|c| c.id == id)
  }

  pub fn stats(&self) -> Stats {
    Stats::of(&self.state.tasks)
  }

  /// Tasks selected and ordered by the current view state.
  pub fn visible(&self) -> Vec<&Task> {
    self.state.view.select(&self.state.tasks)
  }

  #[instrument(skip(self, draft), fields(title = %draft.title))]
  pub fn add_task(
    &mut self,
    draft: TaskDraft
  ) -> Result<Task> {
    let now = self.now();
    let task = self.transact(|state| {
      require_title(&draft.title)?;
      let category_id =
        match draft.category_id.as_deref() {
          | Some(id) => {
            require_category(state, id)?;
            id.to_string()
          }
          | None => {
            state.categories[0].id.clone()
          }
        };

      let task = Task::from_draft(
        draft,
        category_id,
        now
      );
      state.tasks.push(task.clone());
      Ok(task)
    })?;

    debug!(task_id = %task.id, "task added");
    Ok(task)
  }

  #[instrument(skip(self, patch))]
  pub fn update_task(
    &mut self,
    id: &str,
    patch: TaskPatch
  ) -> Result<Task> {
    let now = self.now();
    self.transact(|state| {
      if let Some(category_id) =
        patch.category_id.as_deref()
      {
        require_category(state, category_id)?;
      }
      if let Some(title) = &patch.title {
        require_title(title)?;
      }

      let task = find_task_mut(state, id)?;
      if let Some(title) = patch.title {
        task.title = title.trim().to_string();
      }
      if let Some(description) =
        patch.description
      {
        task.description =
          normalise_text(description);
      }
      if let Some(deadline) = patch.deadline {
        task.deadline = deadline;
      }
      if let Some(priority) = patch.priority {
        task.priority = priority;
      }
      if let Some(category_id) =
        patch.category_id
      {
        task.category_id = category_id;
      }
      if let Some(tags) = patch.tags {
        task.tags = normalise_tags(tags);
      }
      if let Some(completed) = patch.completed
      {
        task.completed = completed;
      }
      task.updated_at = now;
      task.last_notified = None;
      Ok(task.clone())
    })
  }

  #[instrument(skip(self))]
  pub fn delete_task(
    &mut self,
    id: &str
  ) -> Result<Task> {
    self.transact(|state| {
      let idx = state
        .tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or_else(|| {
          TaskflowError::TaskNotFound(
            id.to_string()
          )
        })?;
      Ok(state.tasks.remove(idx))
    })
  }

  #[instrument(skip(self))]
  pub fn toggle_complete(
    &mut self,
    id: &str
  ) -> Result<Task> {
    let now = self.now();
    self.transact(|state| {
      let task = find_task_mut(state, id)?;
      task.completed = !task.completed;
      task.updated_at = now;
      Ok(task.clone())
    })
  }

  /// Moves `dragged_id` to the position `target_id` occupies, shifting
  /// the tasks in between. Sort ties follow this order.
  #[instrument(skip(self))]
  pub fn reorder_task(
    &mut self,
    dragged_id: &str,
    target_id: &str
  ) -> Result<()> {
    if dragged_id == target_id {
      find_task(&self.state, dragged_id)?;
      return Ok(());
    }

    self.transact(|state| {
      let from = position_of(state, dragged_id)?;
      let to = position_of(state, target_id)?;
      let task = state.tasks.remove(from);
      state.tasks.insert(to, task);
      Ok(())
    })
  }

  /// Records a delivered reminder. Not an edit: `updated_at` stays.
  #[instrument(skip(self, at))]
  pub fn mark_notified(
    &mut self,
    id: &str,
    at: DateTime<Utc>
  ) -> Result<()> {
    self.transact(|state| {
      find_task_mut(state, id)?
        .last_notified = Some(at);
      Ok(())
    })
  }

  #[instrument(skip(self, draft), fields(name = %draft.name))]
  pub fn add_category(
    &mut self,
    draft: CategoryDraft
  ) -> Result<Category> {
    let now = self.now();
    self.transact(|state| {
      let name = require_name(&draft.name)?;
      let category = Category {
        id: new_id(),
        name,
        color: color_or_default(draft.color),
        created_at: now
      };
      state.categories.push(category.clone());
      Ok(category)
    })
  }

  #[instrument(skip(self, patch))]
  pub fn update_category(
    &mut self,
    id: &str,
    patch: CategoryPatch
  ) -> Result<Category> {
    self.transact(|state| {
      let name = patch
        .name
        .as_deref()
        .map(require_name)
        .transpose()?;
      let category = state
        .categories
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| {
          TaskflowError::CategoryNotFound(
            id.to_string()
          )
        })?;
      if let Some(name) = name {
        category.name = name;
      }
      if patch.color.is_some() {
        category.color =
          color_or_default(patch.color);
      }
      Ok(category.clone())
    })
  }

  /// Removes a category, moving its tasks to the first remaining
  /// category. The last category can never be removed.
  #[instrument(skip(self))]
  pub fn delete_category(
    &mut self,
    id: &str
  ) -> Result<CategoryRemoval> {
    let removal = self.transact(|state| {
      require_category(state, id)?;
      if state.categories.len() <= 1 {
        return Err(
          TaskflowError::InvariantRefused(
            LAST_CATEGORY_MESSAGE.to_string()
          )
        );
      }

      let reassigned_to = state
        .categories
        .iter()
        .find(|c| c.id != id)
        .map(|c| c.id.clone())
        .ok_or_else(|| {
          TaskflowError::InvariantRefused(
            LAST_CATEGORY_MESSAGE.to_string()
          )
        })?;

      let mut moved_tasks = Vec::new();
      for task in state
        .tasks
        .iter_mut()
        .filter(|t| t.category_id == id)
      {
        task.category_id = reassigned_to.clone();
        moved_tasks.push(task.id.clone());
      }

      let idx = state
        .categories
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(|| {
          TaskflowError::CategoryNotFound(
            id.to_string()
          )
        })?;
      let removed = state.categories.remove(idx);

      if state.view.category.as_deref()
        == Some(id)
      {
        state.view.category = None;
      }

      Ok(CategoryRemoval {
        removed,
        reassigned_to,
        moved_tasks
      })
    });

    match &removal {
      | Ok(r) => {
        info!(
          moved = r.moved_tasks.len(),
          reassigned_to = %r.reassigned_to,
          "category deleted"
        );
      }
      | Err(error) => {
        warn!(%error, "category delete refused");
      }
    }
    removal
  }

  pub fn set_query(
    &mut self,
    query: &str
  ) -> Result<()> {
    self.transact(|state| {
      state.view.query = query.to_string();
      Ok(())
    })
  }

  pub fn set_status_filter(
    &mut self,
    status: StatusFilter
  ) -> Result<()> {
    self.transact(|state| {
      state.view.status = status;
      Ok(())
    })
  }

  pub fn set_sort(
    &mut self,
    sort: SortKey
  ) -> Result<()> {
    self.transact(|state| {
      state.view.sort = sort;
      Ok(())
    })
  }

  pub fn set_category_filter(
    &mut self,
    category: Option<&str>
  ) -> Result<()> {
    self.transact(|state| {
      if let Some(id) = category {
        require_category(state, id)?;
      }
      state.view.category =
        category.map(str::to_string);
      Ok(())
    })
  }

  /// Selecting the already selected category clears the filter.
  pub fn toggle_category_filter(
    &mut self,
    id: &str
  ) -> Result<Option<String>> {
    self.transact(|state| {
      require_category(state, id)?;
      state.view.category =
        if state.view.category.as_deref()
          == Some(id)
        {
          None
        } else {
          Some(id.to_string())
        };
      Ok(state.view.category.clone())
    })
  }

  pub fn toggle_theme(
    &mut self
  ) -> Result<Theme> {
    self.transact(|state| {
      state.view.theme =
        state.view.theme.toggled();
      Ok(state.view.theme)
    })
  }

  fn transact<R>(
    &mut self,
    apply: impl FnOnce(
      &mut Snapshot
    ) -> Result<R>
  ) -> Result<R> {
    let mut next = self.state.clone();
    let out = apply(&mut next)?;
    let blob = next.encode()?;
    self
      .gateway
      .set(&self.key, &blob)
      .map_err(TaskflowError::Storage)?;
    self.state = next;
    Ok(out)
  }
}

fn require_title(title: &str) -> Result<()> {
  if title.trim().is_empty() {
    return Err(TaskflowError::Validation(
      "task title cannot be empty"
        .to_string()
    ));
  }
  Ok(())
}

fn require_name(name: &str) -> Result<String> {
  let name = name.trim();
  if name.is_empty() {
    return Err(TaskflowError::Validation(
      "category name cannot be empty"
        .to_string()
    ));
  }
  Ok(name.to_string())
}

/// Blank colours fall back to the default swatch.
fn color_or_default(color: Option<String>) -> String {
  color
    .filter(|c| !c.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_COLOR.to_string())
}

fn require_category(
  state: &Snapshot,
  id: &str
) -> Result<()> {
  if state
    .categories
    .iter()
    .any(|c| c.id == id)
  {
    Ok(())
  } else {
    Err(TaskflowError::CategoryNotFound(
      id.to_string()
    ))
  }
}

fn find_task<'a>(
  state: &'a Snapshot,
  id: &str
) -> Result<&'a Task> {
  state
    .tasks
    .iter()
    .find(|t| t.id == id)
    .ok_or_else(|| {
      TaskflowError::TaskNotFound(
        id.to_string()
      )
    })
}

fn find_task_mut<'a>(
  state: &'a mut Snapshot,
  id: &str
) -> Result<&'a mut Task> {
  state
    .tasks
    .iter_mut()
    .find(|t| t.id == id)
    .ok_or_else(|| {
      TaskflowError::TaskNotFound(
        id.to_string()
      )
    })
}

fn position_of(
  state: &Snapshot,
  id: &str
) -> Result<usize> {
  state
    .tasks
    .iter()
    .position(|t| t.id == id)
    .ok_or_else(|| {
      TaskflowError::TaskNotFound(
        id.to_string()
      )
    })
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone
  };
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::clock::ManualClock;
  use crate::storage::{
    DEFAULT_STORAGE_KEY,
    MemoryStorage
  };
  use crate::task::Priority;

  fn store() -> (
    TaskStore<MemoryStorage>,
    Rc<ManualClock>
  ) {
    let clock = Rc::new(ManualClock::new(
      Utc
        .with_ymd_and_hms(
          2026, 3, 2, 9, 0, 0
        )
        .unwrap()
    ));
    let store = TaskStore::open(
      MemoryStorage::new(),
      DEFAULT_STORAGE_KEY,
      clock.clone()
    )
    .unwrap();
    (store, clock)
  }

  #[test]
  fn add_assigns_identity_and_timestamps() {
    let (mut store, clock) = store();
    let task = store
      .add_task(
        TaskDraft::new("  Write report ")
          .priority(Priority::High)
          .tag("work")
          .tag("work")
      )
      .unwrap();

    assert_eq!(task.title, "Write report");
    assert_eq!(task.created_at, clock.now());
    assert_eq!(task.updated_at, clock.now());
    assert_eq!(task.category_id, "personal");
    assert_eq!(task.tags, vec!["work"]);
    assert!(!task.completed);
    assert!(task.last_notified.is_none());
    assert_eq!(store.gateway().writes(), 1);
  }

  #[test]
  fn empty_title_is_refused_without_writing() {
    let (mut store, _) = store();
    let err = store
      .add_task(TaskDraft::new("   "))
      .unwrap_err();
    assert!(matches!(
      err,
      TaskflowError::Validation(_)
    ));
    assert!(store.tasks().is_empty());
    assert_eq!(store.gateway().writes(), 0);
  }

  #[test]
  fn update_keeps_created_and_resets_notification() {
    let (mut store, clock) = store();
    let task = store
      .add_task(TaskDraft::new("Call mom"))
      .unwrap();
    store
      .mark_notified(&task.id, clock.now())
      .unwrap();
    assert!(
      store.task(&task.id).unwrap().last_notified.is_some()
    );

    clock.advance(Duration::minutes(5));
    let updated = store
      .update_task(&task.id, TaskPatch {
        title: Some("Call dad".to_string()),
        ..TaskPatch::default()
      })
      .unwrap();

    assert_eq!(updated.id, task.id);
    assert_eq!(updated.title, "Call dad");
    assert_eq!(updated.created_at, task.created_at);
    assert_eq!(updated.updated_at, clock.now());
    assert!(updated.last_notified.is_none());
  }

  #[test]
  fn mark_notified_does_not_touch_updated_at() {
    let (mut store, clock) = store();
    let task = store
      .add_task(TaskDraft::new("Stretch"))
      .unwrap();
    clock.advance(Duration::minutes(1));
    store
      .mark_notified(&task.id, clock.now())
      .unwrap();
    let stored = store.task(&task.id).unwrap();
    assert_eq!(stored.updated_at, task.updated_at);
    assert_eq!(stored.last_notified, Some(clock.now()));
  }

  #[test]
  fn missing_ids_report_not_found() {
    let (mut store, _) = store();
    assert!(
      store.delete_task("nope").unwrap_err().is_not_found()
    );
    assert!(
      store
        .toggle_complete("nope")
        .unwrap_err()
        .is_not_found()
    );
    assert!(
      store
        .update_task("nope", TaskPatch::default())
        .unwrap_err()
        .is_not_found()
    );
    assert!(
      store
        .add_task(
          TaskDraft::new("x").category("nope")
        )
        .unwrap_err()
        .is_not_found()
    );
  }

  #[test]
  fn last_category_cannot_be_deleted() {
    let (mut store, _) = store();
    store.delete_category("work").unwrap();
    store.delete_category("shopping").unwrap();

    let before = store.categories().to_vec();
    let err =
      store.delete_category("personal").unwrap_err();
    assert!(matches!(
      err,
      TaskflowError::InvariantRefused(_)
    ));
    assert_eq!(err.to_string(), LAST_CATEGORY_MESSAGE);
    assert_eq!(store.categories(), before.as_slice());
  }

  #[test]
  fn blank_colour_falls_back_on_add_and_update() {
    let (mut store, _) = store();
    let added = store
      .add_category(CategoryDraft {
        name:  "Garden".to_string(),
        color: Some("  ".to_string())
      })
      .unwrap();
    assert_eq!(added.color, DEFAULT_COLOR);

    let recoloured = store
      .update_category("work", CategoryPatch {
        name:  None,
        color: Some("#10B981".to_string())
      })
      .unwrap();
    assert_eq!(recoloured.color, "#10B981");

    let cleared = store
      .update_category("work", CategoryPatch {
        name:  None,
        color: Some(String::new())
      })
      .unwrap();
    assert_eq!(cleared.color, DEFAULT_COLOR);
    assert_eq!(store.category("work").unwrap().color, DEFAULT_COLOR);
  }

  #[test]
  fn deleting_category_moves_tasks_to_first_remaining() {
    let (mut store, _) = store();
    let a = store
      .add_task(TaskDraft::new("a").category("personal"))
      .unwrap();
    let b = store
      .add_task(TaskDraft::new("b").category("work"))
      .unwrap();
    store.toggle_category_filter("personal").unwrap();

    let removal =
      store.delete_category("personal").unwrap();
    assert_eq!(removal.reassigned_to, "work");
    assert_eq!(removal.moved_tasks, vec![a.id.clone()]);
    assert_eq!(store.task(&a.id).unwrap().category_id, "work");
    assert_eq!(store.task(&b.id).unwrap().category_id, "work");
    assert!(store.view().category.is_none());
  }

  #[test]
  fn toggle_and_reorder() {
    let (mut store, clock) = store();
    let a = store.add_task(TaskDraft::new("a")).unwrap();
    let b = store.add_task(TaskDraft::new("b")).unwrap();
    let c = store.add_task(TaskDraft::new("c")).unwrap();

    clock.advance(Duration::seconds(30));
    let done = store.toggle_complete(&b.id).unwrap();
    assert!(done.completed);
    assert_eq!(done.updated_at, clock.now());
    assert!(!store.toggle_complete(&b.id).unwrap().completed);

    store.reorder_task(&c.id, &a.id).unwrap();
    let order: Vec<&str> = store
      .tasks()
      .iter()
      .map(|t| t.id.as_str())
      .collect();
    assert_eq!(order, vec![c.id.as_str(), a.id.as_str(), b.id.as_str()]);
  }

  #[test]
  fn view_state_survives_reopen() {
    let (mut store, clock) = store();
    store.set_query("milk").unwrap();
    store.set_sort(SortKey::Deadline).unwrap();
    store.set_status_filter(StatusFilter::Completed).unwrap();
    assert_eq!(store.toggle_theme().unwrap(), Theme::Dark);

    let blob = store
      .gateway()
      .raw(DEFAULT_STORAGE_KEY)
      .unwrap()
      .to_string();
    let reopened = TaskStore::open(
      MemoryStorage::with_entry(DEFAULT_STORAGE_KEY, &blob),
      DEFAULT_STORAGE_KEY,
      clock
    )
    .unwrap();
    assert_eq!(reopened.view(), store.view());
  }

  #[test]
  fn toggling_same_category_clears_filter() {
    let (mut store, _) = store();
    assert_eq!(
      store.toggle_category_filter("work").unwrap(),
      Some("work".to_string())
    );
    assert_eq!(store.toggle_category_filter("work").unwrap(), None);
  }
}
