//! Derived views over the task collection.
//!
//! Everything here is a pure function of its arguments: the store
//! hands in its current tasks and view state, and callers recompute
//! after every mutation.

use std::cmp::Ordering;

use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::category::Category;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[cfg_attr(
  feature = "native",
  derive(clap::ValueEnum)
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed
}

impl StatusFilter {
  pub fn matches(self, task: &Task) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Active => {
        !task.completed
      }
      | StatusFilter::Completed => {
        task.completed
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[cfg_attr(
  feature = "native",
  derive(clap::ValueEnum)
)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
  #[default]
  Created,
  Deadline,
  Priority
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark
}

impl Theme {
  pub fn toggled(self) -> Self {
    match self {
      | Theme::Light => Theme::Dark,
      | Theme::Dark => Theme::Light
    }
  }
}

/// Process-wide view settings, persisted with the data.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
  #[serde(default, rename = "searchQuery")]
  pub query:    String,
  #[serde(default, rename = "filterStatus")]
  pub status:   StatusFilter,
  #[serde(
    default,
    rename = "selectedCategoryId",
    deserialize_with = "empty_as_none"
  )]
  pub category: Option<String>,
  #[serde(default, rename = "sortBy")]
  pub sort:     SortKey,
  #[serde(default)]
  pub theme:    Theme
}

impl ViewState {
  pub fn select<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    select(
      tasks,
      &self.query,
      self.status,
      self.category.as_deref(),
      self.sort
    )
  }
}

/// Filters and orders tasks for display.
///
/// A task is kept when it matches the query (case-insensitive
/// substring of title, description or any tag), the status filter and
/// the category filter. The sort is stable, so equal keys keep
/// collection order.
pub fn select<'a>(
  tasks: &'a [Task],
  query: &str,
  status: StatusFilter,
  category: Option<&str>,
  sort: SortKey
) -> Vec<&'a Task> {
  let needle = query.to_lowercase();

  let mut out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      matches_query(task, &needle)
        && status.matches(task)
        && category
          .map(|id| task.category_id == id)
          .unwrap_or(true)
    })
    .collect();

  out.sort_by(|a, b| compare(a, b, sort));

  trace!(
    total = tasks.len(),
    selected = out.len(),
    ?sort,
    "selected visible tasks"
  );
  out
}

fn matches_query(
  task: &Task,
  needle: &str
) -> bool {
  if needle.is_empty() {
    return true;
  }

  task.title.to_lowercase().contains(needle)
    || task
      .description
      .as_ref()
      .map(|d| {
        d.to_lowercase().contains(needle)
      })
      .unwrap_or(false)
    || task.tags.iter().any(|tag| {
      tag.to_lowercase().contains(needle)
    })
}

fn compare(
  a: &Task,
  b: &Task,
  sort: SortKey
) -> Ordering {
  match sort {
    | SortKey::Created => {
      b.created_at.cmp(&a.created_at)
    }
    | SortKey::Deadline => {
      match (a.deadline, b.deadline) {
        | (Some(x), Some(y)) => x.cmp(&y),
        | (Some(_), None) => Ordering::Less,
        | (None, Some(_)) => {
          Ordering::Greater
        }
        | (None, None) => Ordering::Equal
      }
    }
    | SortKey::Priority => {
      b.priority.cmp(&a.priority)
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub struct Stats {
  pub completed: usize,
  pub total:     usize
}

impl Stats {
  pub fn of(tasks: &[Task]) -> Self {
    Self {
      completed: tasks
        .iter()
        .filter(|t| t.completed)
        .count(),
      total:     tasks.len()
    }
  }

  pub fn summary(&self) -> String {
    if self.total == 0 {
      "Start organizing your tasks"
        .to_string()
    } else {
      format!(
        "{} of {} tasks completed",
        self.completed, self.total
      )
    }
  }
}

/// Visible tasks of one category, with its completion progress.
#[derive(Debug, Clone)]
pub struct CategoryGroup<'a> {
  pub category:  &'a Category,
  pub tasks:     Vec<&'a Task>,
  pub completed: usize,
  pub progress:  u8
}

/// Splits an already selected task sequence into per-category groups,
/// in category order. With a category filter active only that
/// category is shown, and only if it has visible tasks.
pub fn group_by_category<'a>(
  categories: &'a [Category],
  visible: &[&'a Task],
  category_filter: Option<&str>
) -> Vec<CategoryGroup<'a>> {
  categories
    .iter()
    .filter(|category| {
      category_filter
        .map(|id| category.id == id)
        .unwrap_or(true)
    })
    .filter_map(|category| {
      let tasks: Vec<&Task> = visible
        .iter()
        .copied()
        .filter(|task| {
          task.category_id == category.id
        })
        .collect();

      if tasks.is_empty()
        && category_filter.is_some()
      {
        return None;
      }

      let completed = tasks
        .iter()
        .filter(|t| t.completed)
        .count();
      let progress = if tasks.is_empty() {
        0
      } else {
        ((completed as f64
          / tasks.len() as f64)
          * 100.0)
          .round() as u8
      };

      Some(CategoryGroup {
        category,
        tasks,
        completed,
        progress
      })
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineStatus {
  pub label:   String,
  pub overdue: bool,
  pub urgent:  bool
}

/// Human countdown to a deadline: "5h left", "3d left",
/// "2h overdue", "4d overdue".
pub fn deadline_status(
  deadline: DateTime<Utc>,
  now: DateTime<Utc>
) -> DeadlineStatus {
  if deadline < now {
    let hours = (now - deadline).num_hours();
    let label = if hours < 24 {
      format!("{hours}h overdue")
    } else {
      format!("{}d overdue", hours / 24)
    };
    return DeadlineStatus {
      label,
      overdue: true,
      urgent: false
    };
  }

  let hours = (deadline - now).num_hours();
  if hours < 24 {
    return DeadlineStatus {
      label:   format!("{hours}h left"),
      overdue: false,
      urgent:  hours < 6
    };
  }

  let days = hours / 24;
  DeadlineStatus {
    label:   format!("{days}d left"),
    overdue: false,
    urgent:  days < 2
  }
}

fn empty_as_none<'de, D>(
  deserializer: D
) -> Result<Option<String>, D::Error>
where
  D: serde::Deserializer<'de>
{
  let raw =
    Option::<String>::deserialize(
      deserializer
    )?;
  Ok(raw.filter(|v| !v.trim().is_empty()))
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::task::{
    Priority,
    Task
  };

  fn task(
    id: &str,
    minutes: i64,
    priority: Priority
  ) -> Task {
    let base = Utc
      .with_ymd_and_hms(
        2026, 3, 2, 9, 0, 0
      )
      .unwrap();
    Task {
      id: id.to_string(),
      title: format!("task {id}"),
      description: None,
      deadline: None,
      priority,
      category_id: "work".to_string(),
      tags: vec![],
      completed: false,
      created_at: base
        + Duration::minutes(minutes),
      updated_at: base
        + Duration::minutes(minutes),
      last_notified: None
    }
  }

  fn ids(tasks: &[&Task]) -> Vec<String> {
    tasks
      .iter()
      .map(|t| t.id.clone())
      .collect()
  }

  #[test]
  fn query_matches_title_description_and_tags()
  {
    let mut a = task("a", 0, Priority::Low);
    a.title = "Quarterly Report".to_string();
    let mut b = task("b", 1, Priority::Low);
    b.description =
      Some("draft the REPORT outline".to_string());
    let mut c = task("c", 2, Priority::Low);
    c.tags = vec!["reporting".to_string()];
    let d = task("d", 3, Priority::Low);
    let tasks = vec![a, b, c, d];

    let out = select(
      &tasks,
      "report",
      StatusFilter::All,
      None,
      SortKey::Created
    );
    assert_eq!(ids(&out), vec!["c", "b", "a"]);
  }

  #[test]
  fn status_and_category_filters_combine() {
    let mut a = task("a", 0, Priority::Low);
    a.completed = true;
    let b = task("b", 1, Priority::Low);
    let mut c = task("c", 2, Priority::Low);
    c.category_id = "personal".to_string();
    let tasks = vec![a, b, c];

    let active = select(
      &tasks,
      "",
      StatusFilter::Active,
      Some("work"),
      SortKey::Created
    );
    assert_eq!(ids(&active), vec!["b"]);

    let done = select(
      &tasks,
      "",
      StatusFilter::Completed,
      None,
      SortKey::Created
    );
    assert_eq!(ids(&done), vec!["a"]);
  }

  #[test]
  fn deadline_sort_puts_undated_last() {
    let base = Utc
      .with_ymd_and_hms(
        2026, 3, 5, 0, 0, 0
      )
      .unwrap();
    let a = task("a", 0, Priority::Low);
    let mut b = task("b", 1, Priority::Low);
    b.deadline =
      Some(base + Duration::hours(5));
    let c = task("c", 2, Priority::Low);
    let mut d = task("d", 3, Priority::Low);
    d.deadline =
      Some(base + Duration::hours(1));
    let tasks = vec![a, b, c, d];

    let out = select(
      &tasks,
      "",
      StatusFilter::All,
      None,
      SortKey::Deadline
    );
    assert_eq!(
      ids(&out),
      vec!["d", "b", "a", "c"]
    );
  }

  #[test]
  fn priority_sort_is_stable_within_level() {
    let tasks = vec![
      task("a", 0, Priority::Low),
      task("b", 1, Priority::High),
      task("c", 2, Priority::Medium),
      task("d", 3, Priority::High),
      task("e", 4, Priority::Low),
    ];

    let out = select(
      &tasks,
      "",
      StatusFilter::All,
      None,
      SortKey::Priority
    );
    assert_eq!(
      ids(&out),
      vec!["b", "d", "c", "a", "e"]
    );
  }

  #[test]
  fn created_sort_is_newest_first_with_stable_ties()
  {
    let a = task("a", 0, Priority::Low);
    let b = task("b", 5, Priority::Low);
    let c = task("c", 5, Priority::Low);
    let tasks = vec![a, b, c];

    let first = select(
      &tasks,
      "",
      StatusFilter::All,
      None,
      SortKey::Created
    );
    let second = select(
      &tasks,
      "",
      StatusFilter::All,
      None,
      SortKey::Created
    );
    assert_eq!(ids(&first), vec!["b", "c", "a"]);
    assert_eq!(ids(&first), ids(&second));
  }

  #[test]
  fn countdown_labels() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 3, 2, 12, 0, 0
      )
      .unwrap();

    let soon = deadline_status(
      now + Duration::hours(3),
      now
    );
    assert_eq!(soon.label, "3h left");
    assert!(soon.urgent);

    let later = deadline_status(
      now + Duration::hours(80),
      now
    );
    assert_eq!(later.label, "3d left");
    assert!(!later.urgent);

    let late = deadline_status(
      now - Duration::hours(50),
      now
    );
    assert_eq!(late.label, "2d overdue");
    assert!(late.overdue);
  }

  #[test]
  fn groups_report_progress() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 3, 2, 12, 0, 0
      )
      .unwrap();
    let categories =
      crate::category::default_categories(
        now
      );
    let mut a = task("a", 0, Priority::Low);
    a.completed = true;
    let b = task("b", 1, Priority::Low);
    let c = task("c", 2, Priority::Low);
    let tasks = vec![a, b, c];
    let visible: Vec<&Task> =
      tasks.iter().collect();

    let groups = group_by_category(
      &categories,
      &visible,
      None
    );
    assert_eq!(groups.len(), 3);
    let work = groups
      .iter()
      .find(|g| g.category.id == "work")
      .unwrap();
    assert_eq!(work.tasks.len(), 3);
    assert_eq!(work.completed, 1);
    assert_eq!(work.progress, 33);

    let filtered = group_by_category(
      &categories,
      &visible,
      Some("personal")
    );
    assert!(filtered.is_empty());
  }

  #[test]
  fn stats_summary() {
    assert_eq!(
      Stats::default().summary(),
      "Start organizing your tasks"
    );
    let stats = Stats {
      completed: 2,
      total:     5
    };
    assert_eq!(
      stats.summary(),
      "2 of 5 tasks completed"
    );
  }
}
