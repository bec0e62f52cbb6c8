//! Delivery surfaces for deadline reminders.
//!
//! A reminder goes out through two independent paths: the system
//! notification channel, gated by a permission the user grants, and the
//! in-app toast, shown only while the app is on screen.

use chrono::Duration;
use serde::{
  Deserialize,
  Serialize
};

use crate::category::Category;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub enum Permission {
  Granted,
  Denied,
  /// Not asked yet, or asked and still waiting for the user.
  Default,
  Unsupported
}

/// What gets shown for a task that reached its deadline.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct Reminder {
  pub task_id:  String,
  pub title:    String,
  pub category: String,
  pub priority: String,
  pub notes:    Option<String>
}

impl Reminder {
  pub fn for_task(
    task: &Task,
    category: Option<&Category>
  ) -> Self {
    Self {
      task_id:  task.id.clone(),
      title:    task.title.clone(),
      category: category
        .map(|c| c.name.clone())
        .unwrap_or_else(|| {
          task.category_id.clone()
        }),
      priority: task.priority.to_string(),
      notes:    task.description.clone()
    }
  }

  pub fn headline(&self) -> String {
    format!("Task due: {}", self.title)
  }

  pub fn body(&self) -> String {
    let mut body = format!(
      "Category: {}\nPriority: {}",
      self.category, self.priority
    );
    if let Some(notes) = &self.notes {
      body.push('\n');
      body.push_str(notes);
    }
    body
  }
}

/// System-level notifications (browser Notification API, desktop
/// notifier, terminal).
pub trait NotificationChannel {
  fn permission(&self) -> Permission;

  /// Asks the user for permission. May return `Default` when the
  /// answer arrives later.
  fn request_permission(
    &mut self
  ) -> Permission;

  /// `tag` is the task id: re-delivery for the same task replaces the
  /// previous notification instead of stacking.
  fn deliver(
    &mut self,
    title: &str,
    body: &str,
    tag: &str
  ) -> anyhow::Result<()>;
}

pub trait ToastSurface {
  fn is_visible(&self) -> bool;

  fn show(
    &mut self,
    reminder: &Reminder,
    dismiss_after: Duration
  );
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
)]
pub struct Delivered {
  pub title: String,
  pub body:  String,
  pub tag:   String
}

/// In-memory channel that records what it was asked to deliver.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
  pub permission: Permission,
  /// Permission handed out by `request_permission`.
  pub answer:     Permission,
  pub requests:   usize,
  pub delivered:  Vec<Delivered>
}

impl MemoryChannel {
  pub fn granted() -> Self {
    Self::with_permission(
      Permission::Granted,
      Permission::Granted
    )
  }

  pub fn with_permission(
    permission: Permission,
    answer: Permission
  ) -> Self {
    Self {
      permission,
      answer,
      requests: 0,
      delivered: vec![]
    }
  }

  pub fn count_for(&self, tag: &str) -> usize {
    self
      .delivered
      .iter()
      .filter(|d| d.tag == tag)
      .count()
  }
}

impl NotificationChannel for MemoryChannel {
  fn permission(&self) -> Permission {
    self.permission
  }

  fn request_permission(
    &mut self
  ) -> Permission {
    self.requests += 1;
    self.permission = self.answer;
    self.permission
  }

  fn deliver(
    &mut self,
    title: &str,
    body: &str,
    tag: &str
  ) -> anyhow::Result<()> {
    self.delivered.push(Delivered {
      title: title.to_string(),
      body:  body.to_string(),
      tag:   tag.to_string()
    });
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct MemoryToasts {
  pub visible: bool,
  pub shown:   Vec<(Reminder, Duration)>
}

impl Default for MemoryToasts {
  fn default() -> Self {
    Self {
      visible: true,
      shown:   vec![]
    }
  }
}

impl MemoryToasts {
  pub fn count_for(
    &self,
    task_id: &str
  ) -> usize {
    self
      .shown
      .iter()
      .filter(|(r, _)| r.task_id == task_id)
      .count()
  }
}

impl ToastSurface for MemoryToasts {
  fn is_visible(&self) -> bool {
    self.visible
  }

  fn show(
    &mut self,
    reminder: &Reminder,
    dismiss_after: Duration
  ) {
    self
      .shown
      .push((reminder.clone(), dismiss_after));
  }
}
