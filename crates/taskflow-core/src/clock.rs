use std::cell::Cell;

use chrono::{
  DateTime,
  Duration,
  Utc
};

/// Source of "now" shared by the store and the scheduler.
pub trait Clock {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Cell<DateTime<Utc>>
}

impl ManualClock {
  pub fn new(
    start: DateTime<Utc>
  ) -> Self {
    Self {
      now: Cell::new(start)
    }
  }

  pub fn set(&self, at: DateTime<Utc>) {
    self.now.set(at);
  }

  pub fn advance(&self, by: Duration) {
    self.now.set(self.now.get() + by);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    self.now.get()
  }
}
