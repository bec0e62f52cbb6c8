use std::io::{
  self,
  IsTerminal,
  Write
};
use std::rc::Rc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{
  DateTime,
  Duration,
  Utc
};
use tracing::{
  info,
  instrument,
  warn
};

use crate::clock::Clock;
use crate::config::Config;
use crate::datetime::parse_deadline;
use crate::notify::{
  NotificationChannel,
  Permission,
  Reminder,
  ToastSurface
};
use crate::render::Renderer;
use crate::scheduler::NotificationScheduler;
use crate::storage::StorageGateway;
use crate::store::TaskStore;
use crate::timers::TimerQueue;

pub type TerminalScheduler = NotificationScheduler<
  TimerQueue,
  TerminalChannel,
  TerminalToasts
>;

/// System notifications for a terminal session: one line on stderr
/// with a bell. Nothing to ask permission for.
#[derive(Debug, Default, Clone)]
pub struct TerminalChannel;

impl NotificationChannel for TerminalChannel {
  fn permission(&self) -> Permission {
    Permission::Granted
  }

  fn request_permission(
    &mut self
  ) -> Permission {
    Permission::Granted
  }

  fn deliver(
    &mut self,
    title: &str,
    body: &str,
    _tag: &str
  ) -> anyhow::Result<()> {
    let mut err = io::stderr().lock();
    writeln!(
      err,
      "\x07{title} ({})",
      body.lines().collect::<Vec<_>>().join(", ")
    )?;
    Ok(())
  }
}

/// In-app toasts, printed to stdout while someone is looking at it.
#[derive(Debug, Clone)]
pub struct TerminalToasts {
  renderer: Renderer
}

impl TerminalToasts {
  pub fn new(renderer: Renderer) -> Self {
    Self { renderer }
  }
}

impl ToastSurface for TerminalToasts {
  fn is_visible(&self) -> bool {
    io::stdout().is_terminal()
  }

  fn show(
    &mut self,
    reminder: &Reminder,
    _dismiss_after: Duration
  ) {
    if let Err(error) =
      self.renderer.print_toast(reminder)
    {
      warn!(%error, "failed to print toast");
    }
  }
}

pub fn terminal_scheduler(
  cfg: &Config,
  clock: Rc<dyn Clock>
) -> TerminalScheduler {
  NotificationScheduler::new(
    cfg.notifications.scheduler_config(),
    TimerQueue::new(clock),
    TerminalChannel,
    TerminalToasts::new(Renderer::new(cfg))
  )
}

#[instrument(skip_all)]
pub(super) fn cmd_watch<S: StorageGateway>(
  store: &mut TaskStore<S>,
  scheduler: &mut TerminalScheduler,
  once_until: Option<&str>
) -> anyhow::Result<()> {
  let until = once_until
    .map(|raw| {
      parse_deadline(raw, store.now())
        .context("invalid --once-until")
    })
    .transpose()?;

  info!(?until, "watching deadlines");
  let delivered =
    watch_loop(store, scheduler, until, |pause| {
      std::thread::sleep(pause)
    })?;
  println!("Delivered {delivered} reminder(s).");
  Ok(())
}

/// Drives the scheduler against real or simulated time.
///
/// Arms every task, then alternates between firing due timers, running
/// the missed-wake sweep once per period, and pausing until the next
/// of those is due. Returns the number of reminders delivered. Without
/// `until` it only returns on error.
pub fn watch_loop<S, N, U>(
  store: &mut TaskStore<S>,
  scheduler: &mut NotificationScheduler<
    TimerQueue,
    N,
    U
  >,
  until: Option<DateTime<Utc>>,
  mut pause: impl FnMut(StdDuration)
) -> anyhow::Result<usize>
where
  S: StorageGateway,
  N: NotificationChannel,
  U: ToastSurface
{
  let period = scheduler.config().sweep_period;
  let mut delivered = 0;

  scheduler.arm_all(store)?;
  delivered += scheduler.sweep(store)?.len();
  let mut next_sweep = store.now() + period;

  loop {
    delivered += scheduler.run_due(store)?.len();

    let now = store.now();
    if now >= next_sweep {
      delivered += scheduler.sweep(store)?.len();
      next_sweep = now + period;
    }

    if until.is_some_and(|limit| now >= limit) {
      break;
    }

    let mut wake = next_sweep;
    if let Some(at) =
      scheduler.driver().next_fire_at()
    {
      wake = wake.min(at);
    }
    if let Some(limit) = until {
      wake = wake.min(limit);
    }

    let wait = (wake - now)
      .to_std()
      .unwrap_or(StdDuration::ZERO)
      .max(StdDuration::from_millis(10));
    pause(wait);
  }

  info!(delivered, "watch finished");
  Ok(delivered)
}
