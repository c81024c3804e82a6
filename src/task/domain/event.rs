//! Append-only task audit log.

use super::{ApprovalState, TaskStatus, VerificationState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Event types emitted by lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    /// Status transition, carrying `from` and `to`.
    Status,
    /// Verification result, carrying `state`.
    Verify,
    /// Plan approval decision, carrying `state`.
    PlanApproval,
    /// A comment was added.
    Comment,
}

impl TaskEventKind {
    /// Returns the `type` value written to documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Verify => "verify",
            Self::PlanApproval => "plan_approval",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit log entry.
///
/// Type-specific fields (`from`/`to`, `state`, ...) are kept as raw values so
/// entries written by newer releases survive a rewrite untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    #[serde(rename = "type")]
    kind: String,
    at: DateTime<Utc>,
    author: String,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
    #[serde(default)]
    note: Option<String>,
}

impl TaskEvent {
    /// Creates an event of an arbitrary type with no extra fields.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        at: DateTime<Utc>,
        author: impl Into<String>,
        note: Option<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            at,
            author: author.into(),
            fields: BTreeMap::new(),
            note,
        }
    }

    /// Creates a status transition event.
    #[must_use]
    pub fn status(
        at: DateTime<Utc>,
        author: impl Into<String>,
        from: TaskStatus,
        to: TaskStatus,
        note: Option<String>,
    ) -> Self {
        Self::new(TaskEventKind::Status.as_str(), at, author, note)
            .with_field("from", Value::from(from.as_str()))
            .with_field("to", Value::from(to.as_str()))
    }

    /// Creates a verification event.
    #[must_use]
    pub fn verify(
        at: DateTime<Utc>,
        author: impl Into<String>,
        state: VerificationState,
        note: Option<String>,
    ) -> Self {
        Self::new(TaskEventKind::Verify.as_str(), at, author, note)
            .with_field("state", Value::from(state.as_str()))
    }

    /// Creates a plan approval event.
    #[must_use]
    pub fn plan_approval(
        at: DateTime<Utc>,
        author: impl Into<String>,
        state: ApprovalState,
        note: Option<String>,
    ) -> Self {
        Self::new(TaskEventKind::PlanApproval.as_str(), at, author, note)
            .with_field("state", Value::from(state.as_str()))
    }

    /// Creates a comment event.
    #[must_use]
    pub fn comment(at: DateTime<Utc>, author: impl Into<String>) -> Self {
        Self::new(TaskEventKind::Comment.as_str(), at, author, None)
    }

    /// Adds a type-specific field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Returns the event type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns when the event happened.
    #[must_use]
    pub const fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Returns who caused the event.
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Returns the attached note.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Returns a type-specific field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the `(from, to)` pair of a status event.
    #[must_use]
    pub fn status_change(&self) -> Option<(TaskStatus, TaskStatus)> {
        if self.kind != TaskEventKind::Status.as_str() {
            return None;
        }
        let parse = |name: &str| {
            self.field(name)
                .and_then(Value::as_str)
                .and_then(|raw| TaskStatus::try_from(raw).ok())
        };
        Some((parse("from")?, parse("to")?))
    }
}

/// Append-only, time-ordered sequence of [`TaskEvent`]s.
///
/// The only mutation is [`TaskEvents::append`]; entries are never edited or
/// removed once recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskEvents(Vec<TaskEvent>);

impl TaskEvents {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an event.
    ///
    /// An event stamped earlier than the current tail is moved forward to
    /// the tail's timestamp so `at` never decreases along the log.
    pub fn append(&mut self, mut event: TaskEvent) {
        if let Some(last) = self.0.last() {
            if event.at < last.at {
                event.at = last.at;
            }
        }
        self.0.push(event);
    }

    /// Iterates over events in recording order.
    pub fn iter(&self) -> std::slice::Iter<'_, TaskEvent> {
        self.0.iter()
    }

    /// Returns the most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&TaskEvent> {
        self.0.last()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when timestamps never decrease along the log.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|pair| match pair {
            [earlier, later] => earlier.at <= later.at,
            _ => true,
        })
    }
}

impl<'a> IntoIterator for &'a TaskEvents {
    type Item = &'a TaskEvent;
    type IntoIter = std::slice::Iter<'a, TaskEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
