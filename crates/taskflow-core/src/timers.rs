use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{
  DateTime,
  Duration,
  Utc
};
use tracing::trace;

use crate::clock::Clock;

pub type TimerId = u64;

/// One-shot wake-up timers keyed by the task they belong to.
///
/// Implementations must not invoke anything synchronously from
/// `schedule`; expiry is reported back to the scheduler through
/// `NotificationScheduler::on_timer`.
pub trait TimerDriver {
  fn schedule(
    &mut self,
    task_id: &str,
    delay: Duration
  ) -> TimerId;

  /// Also called for a timer that has already fired, once the
  /// scheduler has handled it, so the driver can release it.
  fn cancel(&mut self, timer: TimerId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTimer {
  pub task_id: String,
  pub fire_at: DateTime<Utc>
}

/// Virtual timers measured against a `Clock`. Nothing fires on its
/// own: the owner polls `take_due` whenever time may have moved.
pub struct TimerQueue {
  clock:   Rc<dyn Clock>,
  next_id: TimerId,
  pending: BTreeMap<TimerId, QueuedTimer>
}

impl TimerQueue {
  pub fn new(clock: Rc<dyn Clock>) -> Self {
    Self {
      clock,
      next_id: 1,
      pending: BTreeMap::new()
    }
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  pub fn get(
    &self,
    timer: TimerId
  ) -> Option<&QueuedTimer> {
    self.pending.get(&timer)
  }

  /// Timers still pending for a task.
  pub fn for_task(
    &self,
    task_id: &str
  ) -> Vec<TimerId> {
    self
      .pending
      .iter()
      .filter(|(_, t)| t.task_id == task_id)
      .map(|(id, _)| *id)
      .collect()
  }

  pub fn next_fire_at(
    &self
  ) -> Option<DateTime<Utc>> {
    self
      .pending
      .values()
      .map(|t| t.fire_at)
      .min()
  }

  /// Removes and returns every timer due at `now`, earliest first.
  pub fn take_due(
    &mut self,
    now: DateTime<Utc>
  ) -> Vec<TimerId> {
    let mut due: Vec<(DateTime<Utc>, TimerId)> =
      self
        .pending
        .iter()
        .filter(|(_, t)| t.fire_at <= now)
        .map(|(id, t)| (t.fire_at, *id))
        .collect();
    due.sort();

    for (_, id) in &due {
      self.pending.remove(id);
    }
    due.into_iter().map(|(_, id)| id).collect()
  }
}

impl TimerDriver for TimerQueue {
  fn schedule(
    &mut self,
    task_id: &str,
    delay: Duration
  ) -> TimerId {
    let id = self.next_id;
    self.next_id += 1;
    let fire_at = self.clock.now() + delay;
    trace!(timer = id, task_id, %fire_at, "queued timer");
    self.pending.insert(id, QueuedTimer {
      task_id: task_id.to_string(),
      fire_at
    });
    id
  }

  fn cancel(&mut self, timer: TimerId) {
    if self.pending.remove(&timer).is_some() {
      trace!(timer, "cancelled timer");
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::clock::ManualClock;

  #[test]
  fn take_due_returns_expired_in_fire_order() {
    let clock = Rc::new(ManualClock::new(
      Utc
        .with_ymd_and_hms(
          2026, 3, 2, 9, 0, 0
        )
        .unwrap()
    ));
    let mut queue = TimerQueue::new(clock.clone());
    let late =
      queue.schedule("a", Duration::seconds(30));
    let early =
      queue.schedule("b", Duration::seconds(10));
    let never =
      queue.schedule("c", Duration::hours(1));
    queue.cancel(never);

    clock.advance(Duration::seconds(5));
    assert!(queue.take_due(clock.now()).is_empty());

    clock.advance(Duration::seconds(60));
    assert_eq!(
      queue.take_due(clock.now()),
      vec![early, late]
    );
    assert!(queue.is_empty());
  }
}
