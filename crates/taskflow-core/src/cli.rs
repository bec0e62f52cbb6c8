use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{
  ArgAction,
  Args,
  Parser,
  Subcommand
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::Priority;
use crate::view::{
  SortKey,
  StatusFilter
};

#[derive(Debug, Clone)]
pub struct KeyVal {
  pub key:   String,
  pub value: String
}

impl std::str::FromStr for KeyVal {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let (k, v) =
      s.split_once('=').ok_or_else(|| {
        anyhow!(
          "expected KEY=VALUE, got: {s}"
        )
      })?;
    Ok(Self {
      key:   k.trim().to_string(),
      value: v.trim().to_string()
    })
  }
}

#[derive(Parser, Debug, Clone)]
#[command(
  name = "taskflow",
  version,
  about = "Tasks with categories, deadlines and reminders",
  disable_help_subcommand = true
)]
pub struct GlobalCli {
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count,
    global = true
  )]
  pub verbose: u8,

  #[arg(
    short = 'q',
    long = "quiet",
    action = ArgAction::Count,
    global = true
  )]
  pub quiet: u8,

  /// Config file (default: TASKFLOW_CONFIG, then the user config dir).
  #[arg(long = "config", global = true)]
  pub config: Option<PathBuf>,

  /// Data directory holding the task store.
  #[arg(long = "data", global = true)]
  pub data: Option<PathBuf>,

  /// Override a config key, e.g. `--set notifications.toast_secs=8`.
  #[arg(
    long = "set",
    value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
    action = ArgAction::Append,
    global = true
  )]
  pub overrides: Vec<KeyVal>,

  #[command(subcommand)]
  pub command: Option<Command>
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Create a task.
  Add(TaskArgs),
  /// Change fields of a task.
  Edit {
    id:     String,
    #[command(flatten)]
    fields: EditArgs
  },
  /// Toggle a task between open and completed.
  Done { id: String },
  /// Delete a task.
  Rm { id: String },
  /// Move a task to the position another task occupies.
  Move { id: String, target: String },
  /// List tasks through the current view.
  List(ListArgs),
  /// Show every field of one task.
  Show { id: String },
  /// Completion counts.
  Stats,
  #[command(subcommand)]
  Category(CategoryCommand),
  /// Switch between light and dark theme.
  Theme,
  /// Deliver reminders for overdue tasks that were missed.
  Sweep,
  /// Stay in the foreground and deliver reminders as deadlines pass.
  Watch {
    /// Stop at this deadline expression instead of running forever.
    #[arg(long = "once-until")]
    once_until: Option<String>
  }
}

#[derive(Args, Debug, Clone)]
pub struct TaskArgs {
  #[arg(required = true, num_args = 1..)]
  pub title:       Vec<String>,
  #[arg(short = 'd', long = "deadline")]
  pub deadline:    Option<String>,
  #[arg(short = 'p', long = "priority", value_enum)]
  pub priority:    Option<Priority>,
  #[arg(short = 'c', long = "category")]
  pub category:    Option<String>,
  #[arg(short = 't', long = "tag", action = ArgAction::Append)]
  pub tags:        Vec<String>,
  #[arg(short = 'n', long = "notes")]
  pub description: Option<String>
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
  #[arg(long = "title")]
  pub title:          Option<String>,
  #[arg(short = 'd', long = "deadline")]
  pub deadline:       Option<String>,
  #[arg(long = "no-deadline", conflicts_with = "deadline")]
  pub clear_deadline: bool,
  #[arg(short = 'p', long = "priority", value_enum)]
  pub priority:       Option<Priority>,
  #[arg(short = 'c', long = "category")]
  pub category:       Option<String>,
  /// Replaces all tags; pass `--tags ""` to clear them.
  #[arg(long = "tags", value_delimiter = ',')]
  pub tags:           Option<Vec<String>>,
  #[arg(short = 'n', long = "notes")]
  pub description:    Option<String>
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
  #[arg(long = "query")]
  pub query:    Option<String>,
  #[arg(long = "status", value_enum)]
  pub status:   Option<StatusFilter>,
  /// Category id to filter by; `all` clears the filter.
  #[arg(long = "category")]
  pub category: Option<String>,
  #[arg(long = "sort", value_enum)]
  pub sort:     Option<SortKey>,
  /// Group the listing by category.
  #[arg(long = "grouped")]
  pub grouped:  bool
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
  List,
  Add {
    name:  String,
    #[arg(long = "color")]
    color: Option<String>
  },
  Edit {
    id:    String,
    #[arg(long = "name")]
    name:  Option<String>,
    #[arg(long = "color")]
    color: Option<String>
  },
  Rm { id: String },
  /// Toggle the category filter of the view.
  Select { id: String }
}

pub fn init_tracing(
  verbose: u8,
  quiet: u8
) -> anyhow::Result<()> {
  let default_level = if quiet >= 2 {
    "error"
  } else if quiet == 1 {
    "warn"
  } else if verbose >= 3 {
    "trace"
  } else if verbose == 2 {
    "debug"
  } else if verbose == 1 {
    "info"
  } else {
    "warn"
  };

  let env_filter =
    EnvFilter::try_from_default_env()
      .or_else(|_| {
        EnvFilter::try_new(default_level)
      })
      .map_err(|e| {
        anyhow!(
          "invalid RUST_LOG / log filter: {e}"
        )
      })?;

  let init_result = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_level(true)
    .with_writer(std::io::stderr)
    .with_ansi(std::io::stderr().is_terminal())
    .try_init();

  if let Err(err) = init_result {
    debug!(error = %err, "tracing subscriber already set, continuing");
  }

  Ok(())
}
