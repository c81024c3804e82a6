//! Export snapshot of all tasks.
//!
//! The snapshot is a derived JSON artefact for dashboards and other
//! readers. Tasks are ordered by id and the checksum covers a canonical
//! (key-sorted, compact) serialisation of the task list, so two exports of
//! the same tasks carry the same checksum regardless of field order.

use crate::task::{adapters::local::fs::write_atomic, domain::TaskData};
use camino::Utf8Path;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

/// Schema version of the snapshot format.
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// Errors raised while building or writing a snapshot.
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    /// Tasks could not be serialised.
    #[error("failed to serialise export snapshot: {0}")]
    Serialize(String),
    /// The snapshot file could not be written.
    #[error("failed to write export snapshot: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl ExportError {
    fn serialize(err: &serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }

    fn io(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Read-only export of every task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Snapshot format version.
    pub schema_version: u32,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Tasks ordered by id.
    pub tasks: Vec<TaskData>,
    /// Lower-case hex SHA-256 of the canonical task list.
    pub checksum: String,
}

impl TaskSnapshot {
    /// Returns `true` when the checksum matches the tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Serialize`] if the tasks cannot be serialised.
    pub fn verify(&self) -> ExportResult<bool> {
        Ok(tasks_checksum(&self.tasks)? == self.checksum)
    }
}

/// Builds a snapshot, sorting `tasks` by id.
///
/// # Errors
///
/// Returns [`ExportError::Serialize`] if the tasks cannot be serialised.
pub fn build_snapshot<C>(mut tasks: Vec<TaskData>, clock: &C) -> ExportResult<TaskSnapshot>
where
    C: Clock + ?Sized,
{
    tasks.sort_by(|left, right| left.id.cmp(&right.id));
    let checksum = tasks_checksum(&tasks)?;
    Ok(TaskSnapshot {
        schema_version: EXPORT_SCHEMA_VERSION,
        generated_at: clock.utc(),
        tasks,
        checksum,
    })
}

/// Writes a snapshot as pretty JSON, replacing `file` atomically.
///
/// # Errors
///
/// Returns [`ExportError::Io`] when the file cannot be written.
pub fn write_snapshot(dir: &Dir, file: &Utf8Path, snapshot: &TaskSnapshot) -> ExportResult<()> {
    let mut text =
        serde_json::to_string_pretty(snapshot).map_err(|err| ExportError::serialize(&err))?;
    text.push('\n');
    write_atomic(dir, file, text.as_bytes()).map_err(ExportError::io)
}

/// Checksum of a task list as stored in [`TaskSnapshot::checksum`].
///
/// # Errors
///
/// Returns [`ExportError::Serialize`] if the tasks cannot be serialised.
pub fn tasks_checksum(tasks: &[TaskData]) -> ExportResult<String> {
    let value = serde_json::to_value(tasks).map_err(|err| ExportError::serialize(&err))?;
    let digest = Sha256::digest(canonical_json(&value).as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        // Writing to a String cannot fail.
        let _ignored = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

/// Serialises a JSON value compactly with object keys sorted at every level.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (position, key) in keys.into_iter().enumerate() {
                if position > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(out, item);
                }
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
