use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

pub const DEFAULT_COLOR: &str = "#3B82F6";

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id:         String,
  pub name:       String,
  #[serde(default = "default_color")]
  pub color:      String,
  pub created_at: DateTime<Utc>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
)]
pub struct CategoryDraft {
  pub name:  String,
  pub color: Option<String>
}

impl CategoryDraft {
  pub fn new(
    name: impl Into<String>
  ) -> Self {
    Self {
      name:  name.into(),
      color: None
    }
  }

  pub fn color(
    mut self,
    color: impl Into<String>
  ) -> Self {
    self.color = Some(color.into());
    self
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
)]
pub struct CategoryPatch {
  pub name:  Option<String>,
  pub color: Option<String>
}

/// Reported by `TaskStore::delete_category`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRemoval {
  pub removed:       Category,
  pub reassigned_to: String,
  pub moved_tasks:   Vec<String>
}

/// Categories every fresh store starts with.
pub fn default_categories(
  now: DateTime<Utc>
) -> Vec<Category> {
  [
    ("personal", "Personal", "#3B82F6"),
    ("work", "Work", "#8B5CF6"),
    ("shopping", "Shopping", "#10B981")
  ]
  .into_iter()
  .map(|(id, name, color)| {
    Category {
      id:         id.to_string(),
      name:       name.to_string(),
      color:      color.to_string(),
      created_at: now
    }
  })
  .collect()
}

fn default_color() -> String {
  DEFAULT_COLOR.to_string()
}
