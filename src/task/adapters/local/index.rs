//! Schema-versioned task index cache.
//!
//! The index maps task ids to parsed snapshots keyed by document mtime so
//! listings can skip re-parsing unchanged documents. It is advisory: a
//! missing, stale, corrupt or foreign-schema file degrades to a full rescan
//! and is never reported as an error.

use super::fs::{read_optional, write_atomic};
use crate::task::domain::{TaskData, TaskId};
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Schema version written by this release.
pub const INDEX_SCHEMA_VERSION: u32 = 2;

const LEGACY_SCHEMA_VERSION: u64 = 1;

/// Cached snapshot of one task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIndexEntry {
    /// Parsed task header.
    pub task: TaskData,
    /// Document path relative to the tasks root.
    #[serde(rename = "documentPath")]
    pub document_path: String,
    /// Document modification time when the snapshot was taken.
    #[serde(rename = "mtimeMillis")]
    pub mtime_millis: i64,
}

/// Index file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIndexFile {
    /// Schema version of this file.
    pub schema_version: u32,
    /// Entries keyed by task id.
    #[serde(rename = "byId")]
    pub by_id: BTreeMap<TaskId, TaskIndexEntry>,
    /// Task ids keyed by document path.
    #[serde(rename = "byPath")]
    pub by_path: BTreeMap<String, TaskId>,
}

impl Default for TaskIndexFile {
    fn default() -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            by_id: BTreeMap::new(),
            by_path: BTreeMap::new(),
        }
    }
}

impl TaskIndexFile {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from entries, keeping the last entry per id.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = TaskIndexEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    /// Inserts or replaces the entry for a task.
    pub fn insert(&mut self, entry: TaskIndexEntry) {
        let id = entry.task.id.clone();
        if let Some(previous) = self.by_id.remove(&id) {
            self.by_path.remove(&previous.document_path);
        }
        self.by_path.insert(entry.document_path.clone(), id.clone());
        self.by_id.insert(id, entry);
    }

    /// Returns the entry for a task id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&TaskIndexEntry> {
        self.by_id.get(id)
    }

    /// Consumes the index, yielding tasks ordered by id.
    #[must_use]
    pub fn into_tasks(self) -> Vec<TaskData> {
        self.by_id.into_values().map(|entry| entry.task).collect()
    }
}

/// Decodes index file text.
///
/// Current-schema files are validated entry by entry and invalid entries
/// are dropped. Legacy array-shaped files are migrated. Anything else
/// yields `None`.
#[must_use]
pub fn decode_index(text: &str) -> Option<TaskIndexFile> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "task index is not valid JSON; ignoring");
            return None;
        }
    };

    match value {
        Value::Array(entries) => Some(migrate_legacy_entries(&entries)),
        Value::Object(map) => decode_versioned(&map),
        _ => {
            debug!("task index has unexpected shape; ignoring");
            None
        }
    }
}

fn decode_versioned(map: &Map<String, Value>) -> Option<TaskIndexFile> {
    let version = map.get("schema_version").and_then(Value::as_u64);
    match version {
        Some(v) if v == u64::from(INDEX_SCHEMA_VERSION) => Some(decode_current(map)),
        Some(LEGACY_SCHEMA_VERSION) => map
            .get("tasks")
            .and_then(Value::as_array)
            .map(|entries| migrate_legacy_entries(entries)),
        other => {
            debug!(schema_version = ?other, "unsupported task index schema; ignoring");
            None
        }
    }
}

fn decode_current(map: &Map<String, Value>) -> TaskIndexFile {
    let Some(by_id) = map.get("byId").and_then(Value::as_object) else {
        return TaskIndexFile::new();
    };

    let entries = by_id.iter().filter_map(|(key, raw)| {
        match serde_json::from_value::<TaskIndexEntry>(raw.clone()) {
            Ok(entry) if entry.task.id.as_str() == key => Some(entry),
            Ok(_) => {
                debug!(key = %key, "task index entry keyed under wrong id; dropping");
                None
            }
            Err(err) => {
                debug!(key = %key, error = %err, "invalid task index entry; dropping");
                None
            }
        }
    });
    TaskIndexFile::from_entries(entries)
}

/// Converts legacy (schema 1) array entries into the current shape,
/// skipping entries that do not validate.
#[must_use]
pub fn migrate_legacy_entries(entries: &[Value]) -> TaskIndexFile {
    TaskIndexFile::from_entries(
        entries
            .iter()
            .filter_map(|raw| serde_json::from_value::<TaskIndexEntry>(raw.clone()).ok()),
    )
}

/// Handle on the index cache directory.
#[derive(Debug, Clone)]
pub struct TaskIndexCache {
    dir: Arc<Dir>,
}

impl TaskIndexCache {
    /// Wraps an open cache directory.
    #[must_use]
    pub fn new(dir: Dir) -> Self {
        Self { dir: Arc::new(dir) }
    }

    /// Opens (creating if needed) the cache directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from creating or opening the directory.
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        Dir::create_ambient_dir_all(path, ambient_authority())?;
        Ok(Self::new(Dir::open_ambient_dir(path, ambient_authority())?))
    }

    /// Name of the current-schema index file.
    #[must_use]
    pub fn file_name() -> String {
        format!("tasks-index.v{INDEX_SCHEMA_VERSION}.json")
    }

    /// Name of the legacy index file.
    #[must_use]
    pub fn legacy_file_name() -> String {
        format!("tasks-index.v{LEGACY_SCHEMA_VERSION}.json")
    }

    /// Loads the index, falling back to the legacy file.
    ///
    /// Returns `None` when neither file yields a usable index.
    #[must_use]
    pub fn load(&self) -> Option<TaskIndexFile> {
        self.load_file(&Self::file_name())
            .or_else(|| self.load_file(&Self::legacy_file_name()))
    }

    fn load_file(&self, name: &str) -> Option<TaskIndexFile> {
        match read_optional(&self.dir, Utf8Path::new(name)) {
            Ok(Some(text)) => decode_index(&text),
            Ok(None) => None,
            Err(err) => {
                debug!(file = name, error = %err, "task index unreadable; ignoring");
                None
            }
        }
    }

    /// Saves the index when its serialised form differs from the file on
    /// disk. Returns whether a write happened.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from reading or replacing the file.
    pub fn save(&self, index: &TaskIndexFile) -> io::Result<bool> {
        let mut text = serde_json::to_string_pretty(index).map_err(io::Error::other)?;
        text.push('\n');

        let name = Self::file_name();
        let path = Utf8Path::new(&name);
        if read_optional(&self.dir, path)?.as_deref() == Some(text.as_str()) {
            return Ok(false);
        }
        write_atomic(&self.dir, path, text.as_bytes())?;
        Ok(true)
    }
}
