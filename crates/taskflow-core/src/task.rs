use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
#[cfg_attr(
  feature = "native",
  derive(clap::ValueEnum)
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High
}

impl Priority {
  pub fn as_str(self) -> &'static str {
    match self {
      | Priority::Low => "low",
      | Priority::Medium => "medium",
      | Priority::High => "high"
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str()
    {
      | "low" => Ok(Priority::Low),
      | "medium" => Ok(Priority::Medium),
      | "high" => Ok(Priority::High),
      | other => {
        Err(anyhow!(
          "unknown priority: {other}"
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id:            String,
  pub title:         String,
  #[serde(default)]
  pub description:   Option<String>,
  #[serde(default)]
  pub deadline:      Option<DateTime<Utc>>,
  #[serde(default)]
  pub priority:      Priority,
  pub category_id:   String,
  #[serde(default)]
  pub tags:          Vec<String>,
  #[serde(default)]
  pub completed:     bool,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
  #[serde(default)]
  pub last_notified: Option<DateTime<Utc>>
}

impl Task {
  /// Builds a fresh task from an already validated draft.
  pub(crate) fn from_draft(
    draft: TaskDraft,
    category_id: String,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      id: new_id(),
      title: draft.title.trim().to_string(),
      description: normalise_text(
        draft.description
      ),
      deadline: draft.deadline,
      priority: draft.priority,
      category_id,
      tags: normalise_tags(draft.tags),
      completed: draft.completed,
      created_at: now,
      updated_at: now,
      last_notified: None
    }
  }

  pub fn is_overdue(
    &self,
    now: DateTime<Utc>
  ) -> bool {
    !self.completed
      && self
        .deadline
        .map(|deadline| deadline <= now)
        .unwrap_or(false)
  }
}

/// Input for `TaskStore::add_task`.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
)]
pub struct TaskDraft {
  pub title:       String,
  pub description: Option<String>,
  pub deadline:    Option<DateTime<Utc>>,
  pub priority:    Priority,
  pub category_id: Option<String>,
  pub tags:        Vec<String>,
  pub completed:   bool
}

impl TaskDraft {
  pub fn new(
    title: impl Into<String>
  ) -> Self {
    Self {
      title: title.into(),
      ..Self::default()
    }
  }

  pub fn deadline(
    mut self,
    deadline: DateTime<Utc>
  ) -> Self {
    self.deadline = Some(deadline);
    self
  }

  pub fn priority(
    mut self,
    priority: Priority
  ) -> Self {
    self.priority = priority;
    self
  }

  pub fn category(
    mut self,
    category_id: impl Into<String>
  ) -> Self {
    self.category_id =
      Some(category_id.into());
    self
  }

  pub fn description(
    mut self,
    description: impl Into<String>
  ) -> Self {
    self.description =
      Some(description.into());
    self
  }

  pub fn tag(
    mut self,
    tag: impl Into<String>
  ) -> Self {
    self.tags.push(tag.into());
    self
  }
}

/// Partial update merged over an existing task.
///
/// `None` leaves a field alone; for the optional fields
/// `Some(None)` clears the value.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
)]
pub struct TaskPatch {
  pub title:       Option<String>,
  pub description: Option<Option<String>>,
  pub deadline:
    Option<Option<DateTime<Utc>>>,
  pub priority:    Option<Priority>,
  pub category_id: Option<String>,
  pub tags:        Option<Vec<String>>,
  pub completed:   Option<bool>
}

impl TaskPatch {
  pub fn is_empty(&self) -> bool {
    self.title.is_none()
      && self.description.is_none()
      && self.deadline.is_none()
      && self.priority.is_none()
      && self.category_id.is_none()
      && self.tags.is_none()
      && self.completed.is_none()
  }
}

pub(crate) fn new_id() -> String {
  Uuid::new_v4().simple().to_string()
}

pub(crate) fn normalise_text(
  value: Option<String>
) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

/// Trims tags, drops empty ones and suppresses duplicates,
/// keeping the first occurrence.
pub fn normalise_tags(
  tags: Vec<String>
) -> Vec<String> {
  let mut out: Vec<String> =
    Vec::with_capacity(tags.len());
  for raw in tags {
    let tag = raw.trim();
    if tag.is_empty()
      || out.iter().any(|t| t == tag)
    {
      continue;
    }
    out.push(tag.to_string());
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tags_are_trimmed_and_deduplicated() {
    let tags = normalise_tags(vec![
      " home ".to_string(),
      "errand".to_string(),
      "".to_string(),
      "home".to_string(),
    ]);
    assert_eq!(tags, vec!["home", "errand"]);
  }

  #[test]
  fn priority_order_puts_high_last() {
    assert!(Priority::High > Priority::Medium);
    assert!(Priority::Medium > Priority::Low);
    assert_eq!(
      "HIGH".parse::<Priority>().unwrap(),
      Priority::High
    );
    assert!("urgent".parse::<Priority>().is_err());
  }

  #[test]
  fn reads_task_stored_by_browser_build() {
    let raw = r#"{
      "id": "k3j9x0a1b",
      "title": "Buy milk",
      "description": null,
      "deadline": "2026-03-01T17:30:00.000Z",
      "categoryId": "shopping",
      "priority": "high",
      "tags": ["dairy"],
      "completed": false,
      "createdAt": "2026-02-28T08:00:00.000Z",
      "updatedAt": "2026-02-28T08:00:00.000Z"
    }"#;
    let task: Task =
      serde_json::from_str(raw).unwrap();
    assert_eq!(task.priority, Priority::High);
    assert!(task.deadline.is_some());
    assert!(task.last_notified.is_none());
  }
}
