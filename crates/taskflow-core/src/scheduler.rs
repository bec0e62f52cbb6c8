//! Deadline reminders.
//!
//! Each task id owns at most one pending wake-up timer. Timers are
//! best effort: a suspended process does not fire them on time, so a
//! periodic sweep delivers whatever was missed, throttled by a
//! re-notify backoff.

use std::collections::HashMap;

use chrono::{
  DateTime,
  Duration,
  Utc
};
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::error::{
  Result,
  TaskflowError
};
use crate::notify::{
  NotificationChannel,
  Permission,
  Reminder,
  ToastSurface
};
use crate::storage::StorageGateway;
use crate::store::TaskStore;
use crate::task::{
  Task,
  TaskDraft,
  TaskPatch
};
use crate::timers::{
  TimerDriver,
  TimerId,
  TimerQueue
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub enum TimerState {
  Unscheduled,
  Armed,
  Fired,
  Cancelled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
  pub sweep_period:   Duration,
  pub renotify_after: Duration,
  pub toast_duration: Duration
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      sweep_period:   Duration::seconds(60),
      renotify_after: Duration::hours(1),
      toast_duration: Duration::seconds(5)
    }
  }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub task_id: String,
  /// Whether the system channel accepted the notification.
  pub system:  bool,
  /// Whether the in-app toast was shown.
  pub toast:   bool
}

#[derive(Debug, Clone)]
struct Slot {
  state:  TimerState,
  timer:  Option<TimerId>,
  due_at: Option<DateTime<Utc>>
}

impl Default for Slot {
  fn default() -> Self {
    Self {
      state:  TimerState::Unscheduled,
      timer:  None,
      due_at: None
    }
  }
}

pub struct NotificationScheduler<D, N, U> {
  config:  SchedulerConfig,
  driver:  D,
  channel: N,
  toasts:  U,
  slots:   HashMap<String, Slot>
}

impl<D, N, U> NotificationScheduler<D, N, U>
where
  D: TimerDriver,
  N: NotificationChannel,
  U: ToastSurface
{
  pub fn new(
    config: SchedulerConfig,
    driver: D,
    channel: N,
    toasts: U
  ) -> Self {
    Self {
      config,
      driver,
      channel,
      toasts,
      slots: HashMap::new()
    }
  }

  pub fn config(&self) -> &SchedulerConfig {
    &self.config
  }

  pub fn driver(&self) -> &D {
    &self.driver
  }

  pub fn driver_mut(&mut self) -> &mut D {
    &mut self.driver
  }

  pub fn channel(&self) -> &N {
    &self.channel
  }

  pub fn channel_mut(&mut self) -> &mut N {
    &mut self.channel
  }

  pub fn toasts(&self) -> &U {
    &self.toasts
  }

  pub fn toasts_mut(&mut self) -> &mut U {
    &mut self.toasts
  }

  pub fn state(
    &self,
    task_id: &str
  ) -> TimerState {
    self
      .slots
      .get(task_id)
      .map(|s| s.state)
      .unwrap_or(TimerState::Unscheduled)
  }

  pub fn armed_timer(
    &self,
    task_id: &str
  ) -> Option<TimerId> {
    self
      .slots
      .get(task_id)
      .and_then(|s| s.timer)
  }

  /// Number of tasks the scheduler keeps bookkeeping for.
  pub fn tracked_count(&self) -> usize {
    self.slots.len()
  }

  pub fn armed_count(&self) -> usize {
    self
      .slots
      .values()
      .filter(|s| s.timer.is_some())
      .count()
  }

  /// Sets the wake-up timer for a task's deadline, replacing any timer
  /// it already has. Completed tasks and tasks without a deadline are
  /// left alone. A deadline that already passed is delivered right
  /// away unless a reminder went out since the last edit; those are
  /// left to the sweep.
  #[instrument(skip(self, store))]
  pub fn arm<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    task_id: &str
  ) -> Result<TimerState> {
    let now = store.now();
    let (completed, deadline, notified) =
      match store.task(task_id) {
        | Some(task) => {
          (
            task.completed,
            task.deadline,
            task.last_notified.is_some()
          )
        }
        | None => {
          return Err(
            TaskflowError::TaskNotFound(
              task_id.to_string()
            )
          );
        }
      };

    if completed {
      debug!("not arming completed task");
      return Ok(self.state(task_id));
    }
    let Some(deadline) = deadline else {
      debug!("not arming task without deadline");
      return Ok(self.state(task_id));
    };

    self.clear_timer(task_id);
    let delay = deadline - now;

    if delay <= Duration::zero() {
      if notified {
        debug!(
          "deadline passed and already \
           reminded; leaving to sweep"
        );
        let slot = self.slot_mut(task_id);
        slot.state = TimerState::Fired;
        slot.due_at = Some(deadline);
        return Ok(TimerState::Fired);
      }
      self.deliver(store, task_id)?;
      return Ok(TimerState::Fired);
    }

    let timer =
      self.driver.schedule(task_id, delay);
    debug!(
      timer,
      delay_ms = delay.num_milliseconds(),
      "armed deadline timer"
    );
    let slot = self.slot_mut(task_id);
    slot.state = TimerState::Armed;
    slot.timer = Some(timer);
    slot.due_at = Some(deadline);
    Ok(TimerState::Armed)
  }

  /// Cancel-then-arm, driven by the task's current state.
  #[instrument(skip(self, store))]
  pub fn reconcile<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    task_id: &str
  ) -> Result<TimerState> {
    let (completed, has_deadline) =
      match store.task(task_id) {
        | Some(task) => {
          (
            task.completed,
            task.deadline.is_some()
          )
        }
        | None => {
          self.forget(task_id);
          return Ok(TimerState::Cancelled);
        }
      };

    if completed {
      self.cancel(task_id);
      return Ok(TimerState::Cancelled);
    }

    self.clear_timer(task_id);
    if !has_deadline {
      let slot = self.slot_mut(task_id);
      slot.state = TimerState::Unscheduled;
      slot.due_at = None;
      return Ok(TimerState::Unscheduled);
    }

    self.arm(store, task_id)
  }

  /// Arms every task in the store; used at startup.
  #[instrument(skip_all)]
  pub fn arm_all<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>
  ) -> Result<usize> {
    let ids: Vec<String> = store
      .tasks()
      .iter()
      .map(|t| t.id.clone())
      .collect();

    for id in &ids {
      self.reconcile(store, id)?;
    }

    let armed = self.armed_count();
    info!(
      tasks = ids.len(),
      armed, "armed deadline timers"
    );
    Ok(armed)
  }

  /// Drops the pending timer for a task. Returns whether one existed.
  #[instrument(skip(self))]
  pub fn cancel(&mut self, task_id: &str) -> bool {
    let had_timer = self.clear_timer(task_id);
    if let Some(slot) = self.slots.get_mut(task_id)
    {
      slot.state = TimerState::Cancelled;
    }
    had_timer
  }

  /// Handles an expired timer. Callbacks for timers that were
  /// replaced or cancelled in the meantime are ignored; the task is
  /// looked up again so an edit made after arming is respected.
  #[instrument(skip(self, store))]
  pub fn on_timer<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    timer: TimerId
  ) -> Result<Option<Delivery>> {
    let Some(task_id) = self
      .slots
      .iter()
      .find(|(_, slot)| slot.timer == Some(timer))
      .map(|(id, _)| id.clone())
    else {
      debug!(timer, "ignoring stale timer");
      return Ok(None);
    };

    self.slot_mut(&task_id).timer = None;
    self.driver.cancel(timer);
    let now = store.now();

    let deadline = match store.task(&task_id) {
      | Some(task) if !task.completed => {
        task.deadline
      }
      | Some(_) => None,
      | None => {
        self.forget(&task_id);
        return Ok(None);
      }
    };

    match deadline {
      | None => {
        self.slot_mut(&task_id).state =
          TimerState::Cancelled;
        Ok(None)
      }
      | Some(deadline) if deadline > now => {
        debug!(
          task_id = %task_id,
          "timer woke before deadline, re-arming"
        );
        self.arm(store, &task_id)?;
        Ok(None)
      }
      | Some(_) => {
        self.deliver(store, &task_id).map(Some)
      }
    }
  }

  /// Delivers reminders for overdue tasks whose timers were missed.
  ///
  /// A task qualifies when it is open, its deadline has passed, and it
  /// was never reminded or the last reminder is older than the
  /// re-notify backoff.
  #[instrument(skip_all)]
  pub fn sweep<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>
  ) -> Result<Vec<Delivery>> {
    let now = store.now();
    let backoff = self.config.renotify_after;
    let missed: Vec<String> = store
      .tasks()
      .iter()
      .filter(|task| {
        is_missed(task, now, backoff)
      })
      .map(|task| task.id.clone())
      .collect();

    let mut delivered =
      Vec::with_capacity(missed.len());
    for id in &missed {
      delivered.push(self.deliver(store, id)?);
    }

    if delivered.is_empty() {
      debug!("sweep found nothing missed");
    } else {
      info!(
        count = delivered.len(),
        "sweep delivered missed reminders"
      );
    }
    Ok(delivered)
  }

  pub fn add_task<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    draft: TaskDraft
  ) -> Result<Task> {
    let task = store.add_task(draft)?;
    self.reconcile(store, &task.id)?;
    Ok(task)
  }

  /// Updates a task and re-arms its timer when the deadline or the
  /// completion flag changed.
  pub fn update_task<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    task_id: &str,
    patch: TaskPatch
  ) -> Result<Task> {
    let rearm = patch.deadline.is_some()
      || patch.completed.is_some();
    let task = store.update_task(task_id, patch)?;
    if rearm {
      self.reconcile(store, task_id)?;
    }
    Ok(task)
  }

  pub fn toggle_complete<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    task_id: &str
  ) -> Result<Task> {
    let task = store.toggle_complete(task_id)?;
    self.reconcile(store, task_id)?;
    Ok(task)
  }

  pub fn delete_task<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    task_id: &str
  ) -> Result<Task> {
    let task = store.delete_task(task_id)?;
    self.forget(task_id);
    Ok(task)
  }

  fn deliver<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>,
    task_id: &str
  ) -> Result<Delivery> {
    let now = store.now();
    let task =
      store.task(task_id).ok_or_else(|| {
        TaskflowError::TaskNotFound(
          task_id.to_string()
        )
      })?;
    let deadline = task.deadline;
    let reminder = Reminder::for_task(
      task,
      store.category(&task.category_id)
    );

    self.clear_timer(task_id);
    let system = self.deliver_system(&reminder);
    let toast = if self.toasts.is_visible() {
      self.toasts.show(
        &reminder,
        self.config.toast_duration
      );
      true
    } else {
      false
    };

    store.mark_notified(task_id, now)?;
    let slot = self.slot_mut(task_id);
    slot.state = TimerState::Fired;
    slot.due_at = deadline;

    info!(
      task_id,
      system, toast, "delivered deadline reminder"
    );
    Ok(Delivery {
      task_id: task_id.to_string(),
      system,
      toast
    })
  }

  fn deliver_system(
    &mut self,
    reminder: &Reminder
  ) -> bool {
    let permission = match self.channel.permission()
    {
      | Permission::Default => {
        let answer =
          self.channel.request_permission();
        info!(
          permission = ?answer,
          "requested notification permission"
        );
        answer
      }
      | other => other
    };

    if permission != Permission::Granted {
      debug!(
        ?permission,
        "skipping system notification"
      );
      return false;
    }

    match self.channel.deliver(
      &reminder.headline(),
      &reminder.body(),
      &reminder.task_id
    ) {
      | Ok(()) => true,
      | Err(error) => {
        warn!(
          error = %error,
          task_id = %reminder.task_id,
          "system notification failed"
        );
        false
      }
    }
  }

  fn clear_timer(&mut self, task_id: &str) -> bool {
    let Some(timer) = self
      .slots
      .get_mut(task_id)
      .and_then(|slot| slot.timer.take())
    else {
      return false;
    };
    self.driver.cancel(timer);
    true
  }

  /// Cancels any timer and drops the task's slot entirely.
  fn forget(&mut self, task_id: &str) -> bool {
    let had_timer = self.clear_timer(task_id);
    self.slots.remove(task_id);
    had_timer
  }

  fn slot_mut(&mut self, task_id: &str) -> &mut Slot {
    self
      .slots
      .entry(task_id.to_string())
      .or_default()
  }
}

impl<N, U> NotificationScheduler<TimerQueue, N, U>
where
  N: NotificationChannel,
  U: ToastSurface
{
  /// Fires every queued timer that is due at the store's current time.
  pub fn run_due<S: StorageGateway>(
    &mut self,
    store: &mut TaskStore<S>
  ) -> Result<Vec<Delivery>> {
    let due =
      self.driver.take_due(store.now());
    let mut delivered = Vec::new();
    for timer in due {
      if let Some(delivery) =
        self.on_timer(store, timer)?
      {
        delivered.push(delivery);
      }
    }
    Ok(delivered)
  }
}

fn is_missed(
  task: &Task,
  now: DateTime<Utc>,
  backoff: Duration
) -> bool {
  if !task.is_overdue(now) {
    return false;
  }
  task
    .last_notified
    .map(|at| now - at > backoff)
    .unwrap_or(true)
}
