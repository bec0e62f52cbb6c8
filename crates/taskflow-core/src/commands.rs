mod categories;
mod task_ops;
mod views;
mod watch;

use anyhow::anyhow;
use tracing::{
  debug,
  instrument
};

pub use watch::{
  TerminalChannel,
  TerminalScheduler,
  TerminalToasts,
  terminal_scheduler,
  watch_loop
};

use crate::cli::Command;
use crate::config::Config;
use crate::render::Renderer;
use crate::storage::StorageGateway;
use crate::store::TaskStore;

#[instrument(skip_all)]
pub fn dispatch<S: StorageGateway>(
  store: &mut TaskStore<S>,
  cfg: &Config,
  renderer: &mut Renderer,
  command: Command
) -> anyhow::Result<()> {
  debug!(?command, "dispatching command");

  let mut reminders =
    cfg.notifications.enabled.then(|| {
      terminal_scheduler(cfg, store.clock())
    });

  match command {
    | Command::Add(args) => {
      task_ops::cmd_add(
        store,
        reminders.as_mut(),
        args
      )
    }
    | Command::Edit { id, fields } => {
      task_ops::cmd_edit(
        store,
        reminders.as_mut(),
        &id,
        fields
      )
    }
    | Command::Done { id } => {
      task_ops::cmd_done(
        store,
        reminders.as_mut(),
        &id
      )
    }
    | Command::Rm { id } => {
      task_ops::cmd_rm(
        store,
        reminders.as_mut(),
        &id
      )
    }
    | Command::Move { id, target } => {
      task_ops::cmd_move(store, &id, &target)
    }
    | Command::Show { id } => {
      task_ops::cmd_show(store, renderer, &id)
    }
    | Command::List(args) => {
      views::cmd_list(store, renderer, args)
    }
    | Command::Stats => {
      views::cmd_stats(store, renderer)
    }
    | Command::Theme => views::cmd_theme(store),
    | Command::Category(sub) => {
      categories::dispatch(store, renderer, sub)
    }
    | Command::Sweep => {
      let Some(scheduler) = reminders.as_mut()
      else {
        println!("Notifications are disabled.");
        return Ok(());
      };
      let delivered = scheduler.sweep(store)?;
      println!(
        "Delivered {} reminder(s).",
        delivered.len()
      );
      Ok(())
    }
    | Command::Watch { once_until } => {
      let Some(scheduler) = reminders.as_mut()
      else {
        return Err(anyhow!(
          "notifications are disabled; set \
           notifications.enabled = true to watch"
        ));
      };
      watch::cmd_watch(
        store,
        scheduler,
        once_until.as_deref()
      )
    }
  }
}

/// Resolves a full task id or a unique prefix of one.
pub fn resolve_task_id<S: StorageGateway>(
  store: &TaskStore<S>,
  token: &str
) -> anyhow::Result<String> {
  resolve_id(
    store.tasks().iter().map(|t| t.id.as_str()),
    token,
    "task"
  )
}

pub fn resolve_category_id<S: StorageGateway>(
  store: &TaskStore<S>,
  token: &str
) -> anyhow::Result<String> {
  resolve_id(
    store
      .categories()
      .iter()
      .map(|c| c.id.as_str()),
    token,
    "category"
  )
}

fn resolve_id<'a>(
  ids: impl Iterator<Item = &'a str>,
  token: &str,
  kind: &str
) -> anyhow::Result<String> {
  let token = token.trim();
  if token.is_empty() {
    return Err(anyhow!("{kind} id cannot be empty"));
  }

  let mut matches = Vec::new();
  for id in ids {
    if id == token {
      return Ok(id.to_string());
    }
    if id.starts_with(token) {
      matches.push(id);
    }
  }

  match matches.as_slice() {
    | [only] => Ok((*only).to_string()),
    | [] => Err(anyhow!("{kind} not found: {token}")),
    | many => {
      Err(anyhow!(
        "{kind} id {token} is ambiguous ({} matches)",
        many.len()
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefix_resolution() {
    let ids = ["abc123", "abd456", "work"];
    assert_eq!(
      resolve_id(ids.into_iter(), "abc", "task")
        .unwrap(),
      "abc123"
    );
    assert_eq!(
      resolve_id(ids.into_iter(), "work", "task")
        .unwrap(),
      "work"
    );
    let ambiguous =
      resolve_id(ids.into_iter(), "ab", "task")
        .unwrap_err();
    assert!(ambiguous.to_string().contains("ambiguous"));
    assert!(
      resolve_id(ids.into_iter(), "zz", "task")
        .is_err()
    );
  }
}
