pub mod category;
#[cfg(feature = "native")]
pub mod cli;
pub mod clock;
#[cfg(feature = "native")]
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod notify;
#[cfg(feature = "native")]
pub mod render;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod task;
pub mod timers;
pub mod view;

#[cfg(feature = "native")]
use std::ffi::OsString;
#[cfg(feature = "native")]
use std::rc::Rc;

#[cfg(feature = "native")]
use anyhow::Context;
#[cfg(feature = "native")]
use clap::Parser;
#[cfg(feature = "native")]
use tracing::{
  debug,
  info
};

pub use error::{
  Result,
  TaskflowError
};

#[cfg(feature = "native")]
#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli = cli::GlobalCli::parse_from(
    raw_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskflow"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;
  debug!(?cfg, "effective config");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStorage::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open storage at {}",
          data_dir.display()
        )
      })?;
  let clock: Rc<dyn clock::Clock> =
    Rc::new(clock::SystemClock);
  let mut store = store::TaskStore::open(
    storage,
    &cfg.storage_key,
    clock
  )?;

  let mut renderer =
    render::Renderer::new(&cfg);
  let command =
    cli.command.unwrap_or_else(|| {
      cli::Command::List(
        cli::ListArgs::default()
      )
    });

  commands::dispatch(
    &mut store,
    &cfg,
    &mut renderer,
    command
  )?;

  info!("done");
  Ok(())
}
