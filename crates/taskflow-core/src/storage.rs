use std::collections::HashMap;
#[cfg(feature = "native")]
use std::fs;
#[cfg(feature = "native")]
use std::io::Write;
#[cfg(feature = "native")]
use std::path::{Path, PathBuf};

#[cfg(feature = "native")]
use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "native")]
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::category::{Category, default_categories};
use crate::error::{Result, TaskflowError};
use crate::task::{Task, normalise_tags};
use crate::view::ViewState;

pub const DEFAULT_STORAGE_KEY: &str = "taskflow-data";

/// Key/value blob storage the store persists through.
pub trait StorageGateway {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, blob: &str) -> anyhow::Result<()>;
}

impl<T: StorageGateway + ?Sized> StorageGateway for Box<T> {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, blob: &str) -> anyhow::Result<()> {
        (**self).set(key, blob)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, blob: &str) -> Self {
        let mut storage = Self::default();
        storage.entries.insert(key.to_string(), blob.to_string());
        storage
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl StorageGateway for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), blob.to_string());
        self.writes += 1;
        Ok(())
    }
}

/// One JSON file per key inside a data directory.
#[cfg(feature = "native")]
#[derive(Debug, Clone)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

#[cfg(feature = "native")]
impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        tracing::info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.data_dir.join(format!("{safe}.json"))
    }
}

#[cfg(feature = "native")]
impl StorageGateway for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "no stored blob");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, blob), fields(bytes = blob.len()))]
    fn set(&mut self, key: &str, blob: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), "writing blob atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(blob.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// Everything that is persisted, in the shape the browser build
/// writes to `localStorage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(flatten)]
    pub view: ViewState,
}

impl Snapshot {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            tasks: vec![],
            categories: default_categories(now),
            view: ViewState::default(),
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(TaskflowError::StorageCorrupt)
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| TaskflowError::Storage(err.into()))
    }

    /// Loads a stored blob, falling back to a fresh snapshot when it is
    /// absent or unreadable.
    pub fn load_or_default(raw: Option<&str>, now: DateTime<Utc>) -> Self {
        let Some(raw) = raw else {
            debug!("no stored data, starting fresh");
            return Self::fresh(now);
        };

        match Self::decode(raw) {
            Ok(mut snapshot) => {
                snapshot.repair(now);
                debug!(
                    tasks = snapshot.tasks.len(),
                    categories = snapshot.categories.len(),
                    "restored stored data"
                );
                snapshot
            }
            Err(error) => {
                tracing::error!(%error, "discarding unreadable stored data");
                Self::fresh(now)
            }
        }
    }

    /// Re-establishes the invariants a hand-edited or older blob may
    /// break: at least one category, no dangling category references,
    /// clean tags, a category filter that points somewhere.
    pub fn repair(&mut self, now: DateTime<Utc>) {
        if self.categories.is_empty() {
            warn!("stored data has no categories, restoring defaults");
            self.categories = default_categories(now);
        }

        let fallback = self.categories[0].id.clone();
        for task in &mut self.tasks {
            if !self.categories.iter().any(|c| c.id == task.category_id) {
                warn!(
                    task_id = %task.id,
                    category_id = %task.category_id,
                    "task references a missing category, reassigning"
                );
                task.category_id = fallback.clone();
            }
            task.tags = normalise_tags(std::mem::take(&mut task.tags));
        }

        if let Some(selected) = &self.view.category
            && !self.categories.iter().any(|c| &c.id == selected)
        {
            self.view.category = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::view::{SortKey, StatusFilter, Theme};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn missing_blob_starts_with_default_categories() {
        let snapshot = Snapshot::load_or_default(None, now());
        assert!(snapshot.tasks.is_empty());
        let ids: Vec<&str> = snapshot.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["personal", "work", "shopping"]);
    }

    #[test]
    fn malformed_blob_falls_back_to_defaults() {
        let snapshot = Snapshot::load_or_default(Some("{not json"), now());
        assert_eq!(snapshot, Snapshot::fresh(now()));
        assert!(matches!(
            Snapshot::decode("[1,2]"),
            Err(TaskflowError::StorageCorrupt(_))
        ));
    }

    #[test]
    fn view_state_is_restored_verbatim() {
        let raw = r##"{
            "tasks": [],
            "categories": [
                {"id": "work", "name": "Work", "color": "#8B5CF6",
                 "createdAt": "2026-01-01T00:00:00.000Z"}
            ],
            "theme": "dark",
            "searchQuery": "milk",
            "filterStatus": "active",
            "sortBy": "priority",
            "selectedCategoryId": "work"
        }"##;
        let snapshot = Snapshot::load_or_default(Some(raw), now());
        assert_eq!(snapshot.view.theme, Theme::Dark);
        assert_eq!(snapshot.view.query, "milk");
        assert_eq!(snapshot.view.status, StatusFilter::Active);
        assert_eq!(snapshot.view.sort, SortKey::Priority);
        assert_eq!(snapshot.view.category.as_deref(), Some("work"));
    }

    #[test]
    fn repair_reassigns_dangling_categories() {
        let raw = r#"{
            "tasks": [{
                "id": "t1", "title": "Orphan", "categoryId": "gone",
                "priority": "low", "tags": ["a", "a"], "completed": false,
                "createdAt": "2026-01-01T00:00:00Z",
                "updatedAt": "2026-01-01T00:00:00Z"
            }],
            "categories": [],
            "selectedCategoryId": ""
        }"#;
        let snapshot = Snapshot::load_or_default(Some(raw), now());
        assert_eq!(snapshot.categories.len(), 3);
        assert_eq!(snapshot.tasks[0].category_id, "personal");
        assert_eq!(snapshot.tasks[0].tags, vec!["a"]);
        assert!(snapshot.view.category.is_none());
    }

    #[cfg(feature = "native")]
    #[test]
    fn file_storage_round_trips_blob() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut storage = FileStorage::open(temp.path()).expect("open storage");

        assert!(storage.get(DEFAULT_STORAGE_KEY).expect("get").is_none());
        storage.set(DEFAULT_STORAGE_KEY, "{\"tasks\":[]}").expect("set");
        assert_eq!(
            storage.get(DEFAULT_STORAGE_KEY).expect("get").as_deref(),
            Some("{\"tasks\":[]}")
        );
        assert!(storage.path_for("taskflow/data").ends_with("taskflow_data.json"));
    }
}
