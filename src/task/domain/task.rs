//! The canonical in-memory task record.

use super::{IdSource, PlanApproval, TaskDomainError, TaskEvents, TaskId, TaskStatus, Verification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// A comment left on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskComment {
    /// Comment author.
    pub author: String,
    /// Comment text.
    pub body: String,
}

impl TaskComment {
    /// Creates a comment.
    #[must_use]
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
        }
    }
}

/// Git commit linked to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCommit {
    /// Commit hash.
    pub hash: String,
    /// Commit subject line.
    pub message: String,
}

impl TaskCommit {
    /// Creates a commit reference.
    #[must_use]
    pub fn new(hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            message: message.into(),
        }
    }
}

fn default_priority() -> String {
    "med".to_owned()
}

const fn default_doc_version() -> u32 {
    1
}

/// Task record shared by every backend.
///
/// This is the typed form of a task document header. Keys the record does
/// not model are kept in [`TaskData::extra`] and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    /// Stable identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Current status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority label (`low`, `med`, `high`, ...).
    #[serde(default = "default_priority")]
    pub priority: String,
    /// Owning agent or person.
    #[serde(default)]
    pub owner: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Creator.
    #[serde(default)]
    pub created_by: Option<String>,
    /// Free-form provenance (for example the issue a task was imported from).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Value>,
    /// Tasks that must be `DONE` before this one can progress.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Verification commands.
    #[serde(default)]
    pub verify: Vec<String>,
    /// Plan approval gate.
    #[serde(default)]
    pub plan_approval: PlanApproval,
    /// Verification gate.
    #[serde(default)]
    pub verification: Verification,
    /// Linked commit.
    #[serde(default)]
    pub commit: Option<TaskCommit>,
    /// Discussion thread.
    #[serde(default)]
    pub comments: Vec<TaskComment>,
    /// Audit log.
    #[serde(default)]
    pub events: TaskEvents,
    /// Number of persisted mutations of this document.
    #[serde(default = "default_doc_version")]
    pub doc_version: u32,
    /// Time of the last persisted mutation.
    #[serde(default)]
    pub doc_updated_at: Option<DateTime<Utc>>,
    /// Author of the last persisted mutation.
    #[serde(default)]
    pub doc_updated_by: Option<String>,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Whether the id was generated or supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_source: Option<IdSource>,
    /// Housekeeping flag for documents with uncommitted edits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    /// Header keys not modelled above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TaskData {
    /// Creates a `TODO` task with pending gates and an empty audit log.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] if the title is blank.
    pub fn new(id: TaskId, title: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw_title = title.into();
        let normalized_title = raw_title.trim();
        if normalized_title.is_empty() {
            return Err(TaskDomainError::EmptyTitle);
        }

        Ok(Self {
            id,
            title: normalized_title.to_owned(),
            status: TaskStatus::Todo,
            priority: default_priority(),
            owner: String::new(),
            created_at: None,
            created_by: None,
            origin: None,
            depends_on: Vec::new(),
            tags: Vec::new(),
            verify: Vec::new(),
            plan_approval: PlanApproval::pending(),
            verification: Verification::pending(),
            commit: None,
            comments: Vec::new(),
            events: TaskEvents::new(),
            doc_version: default_doc_version(),
            doc_updated_at: None,
            doc_updated_by: None,
            description: String::new(),
            id_source: None,
            dirty: None,
            extra: BTreeMap::new(),
        })
    }

    /// Removes duplicate set entries and self-dependencies.
    ///
    /// `depends_on`, `tags` and `verify` keep the first occurrence of every
    /// value. Applied on every read and write.
    pub fn normalize(&mut self) {
        let own_id = self.id.clone();
        dedup_in_place(&mut self.depends_on);
        self.depends_on.retain(|dependency| *dependency != own_id);
        dedup_in_place(&mut self.tags);
        dedup_in_place(&mut self.verify);
    }

    /// Returns a normalised copy.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Stamps a persisted mutation of a document previously at
    /// `previous_version`.
    ///
    /// `doc_version` moves past `previous_version` unless the caller already
    /// advanced it, and `doc_updated_at` is set to `at`.
    pub fn stamp_update(&mut self, previous_version: u32, at: DateTime<Utc>) {
        if self.doc_version <= previous_version {
            self.doc_version = previous_version.saturating_add(1);
        }
        self.doc_updated_at = Some(at);
    }

    /// Returns `true` when the task is finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

fn dedup_in_place<T>(values: &mut Vec<T>)
where
    T: Clone + Eq + std::hash::Hash,
{
    let mut seen = HashSet::with_capacity(values.len());
    values.retain(|value| seen.insert(value.clone()));
}
