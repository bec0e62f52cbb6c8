use anyhow::Context;
use tracing::{
  info,
  instrument
};

use super::{
  TerminalScheduler,
  resolve_category_id,
  resolve_task_id
};
use crate::cli::{
  EditArgs,
  TaskArgs
};
use crate::datetime::parse_deadline;
use crate::render::{
  Renderer,
  short_id
};
use crate::storage::StorageGateway;
use crate::store::TaskStore;
use crate::task::{
  Task,
  TaskDraft,
  TaskPatch
};

#[instrument(skip_all)]
pub(super) fn cmd_add<S: StorageGateway>(
  store: &mut TaskStore<S>,
  reminders: Option<&mut TerminalScheduler>,
  args: TaskArgs
) -> anyhow::Result<()> {
  info!("command add");
  let now = store.now();

  let mut draft =
    TaskDraft::new(args.title.join(" "));
  draft.description = args.description;
  draft.tags = args.tags;
  if let Some(priority) = args.priority {
    draft.priority = priority;
  }
  if let Some(raw) = args.deadline.as_deref() {
    draft.deadline = Some(
      parse_deadline(raw, now)
        .context("invalid --deadline")?
    );
  }
  if let Some(category) = args.category.as_deref()
  {
    draft.category_id =
      Some(resolve_category_id(store, category)?);
  }

  let task = match reminders {
    | Some(scheduler) => {
      scheduler.add_task(store, draft)?
    }
    | None => store.add_task(draft)?
  };

  println!(
    "Created task {} ({}).",
    short_id(&task.id),
    task.title
  );
  Ok(())
}

#[instrument(skip_all, fields(id = token))]
pub(super) fn cmd_edit<S: StorageGateway>(
  store: &mut TaskStore<S>,
  reminders: Option<&mut TerminalScheduler>,
  token: &str,
  fields: EditArgs
) -> anyhow::Result<()> {
  info!("command edit");
  let id = resolve_task_id(store, token)?;
  let patch = build_patch(store, fields)?;
  if patch.is_empty() {
    println!("Nothing to change.");
    return Ok(());
  }

  let task = match reminders {
    | Some(scheduler) => {
      scheduler.update_task(store, &id, patch)?
    }
    | None => store.update_task(&id, patch)?
  };

  println!("Updated task {}.", short_id(&task.id));
  Ok(())
}

fn build_patch<S: StorageGateway>(
  store: &TaskStore<S>,
  fields: EditArgs
) -> anyhow::Result<TaskPatch> {
  let deadline = if fields.clear_deadline {
    Some(None)
  } else {
    fields
      .deadline
      .as_deref()
      .map(|raw| {
        parse_deadline(raw, store.now())
          .context("invalid --deadline")
      })
      .transpose()?
      .map(Some)
  };

  let category_id = fields
    .category
    .as_deref()
    .map(|token| resolve_category_id(store, token))
    .transpose()?;

  Ok(TaskPatch {
    title: fields.title,
    description: fields.description.map(Some),
    deadline,
    priority: fields.priority,
    category_id,
    tags: fields.tags,
    completed: None
  })
}

#[instrument(skip_all, fields(id = token))]
pub(super) fn cmd_done<S: StorageGateway>(
  store: &mut TaskStore<S>,
  reminders: Option<&mut TerminalScheduler>,
  token: &str
) -> anyhow::Result<()> {
  info!("command done");
  let id = resolve_task_id(store, token)?;
  let task = match reminders {
    | Some(scheduler) => {
      scheduler.toggle_complete(store, &id)?
    }
    | None => store.toggle_complete(&id)?
  };

  let state = if task.completed {
    "Completed"
  } else {
    "Reopened"
  };
  println!(
    "{state} task {} ({}).",
    short_id(&task.id),
    task.title
  );
  Ok(())
}

#[instrument(skip_all, fields(id = token))]
pub(super) fn cmd_rm<S: StorageGateway>(
  store: &mut TaskStore<S>,
  reminders: Option<&mut TerminalScheduler>,
  token: &str
) -> anyhow::Result<()> {
  info!("command rm");
  let id = resolve_task_id(store, token)?;
  let task: Task = match reminders {
    | Some(scheduler) => {
      scheduler.delete_task(store, &id)?
    }
    | None => store.delete_task(&id)?
  };
  println!(
    "Deleted task {} ({}).",
    short_id(&task.id),
    task.title
  );
  Ok(())
}

#[instrument(skip_all)]
pub(super) fn cmd_move<S: StorageGateway>(
  store: &mut TaskStore<S>,
  token: &str,
  target: &str
) -> anyhow::Result<()> {
  let id = resolve_task_id(store, token)?;
  let target = resolve_task_id(store, target)?;
  store.reorder_task(&id, &target)?;
  println!(
    "Moved task {} to the position of {}.",
    short_id(&id),
    short_id(&target)
  );
  Ok(())
}

pub(super) fn cmd_show<S: StorageGateway>(
  store: &TaskStore<S>,
  renderer: &mut Renderer,
  token: &str
) -> anyhow::Result<()> {
  let id = resolve_task_id(store, token)?;
  let task = store.task(&id).with_context(|| {
    format!("task not found: {id}")
  })?;
  renderer.print_task_info(
    task,
    store.category(&task.category_id),
    store.now()
  )
}
