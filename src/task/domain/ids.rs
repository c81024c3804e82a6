//! Task identifiers.

use super::TaskDomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable task identifier in `<YYYYMMDDHHMM>-<SUFFIX>` form.
///
/// The timestamp part is the UTC minute the id was allocated; the suffix is
/// upper-case alphanumeric. Ids are opaque once assigned and never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Number of digits in the timestamp prefix.
    pub const TIMESTAMP_LEN: usize = 12;

    /// Longest accepted suffix.
    pub const MAX_SUFFIX_LEN: usize = 16;

    /// Parses and validates a task identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskId`] when the value does not
    /// follow the identifier grammar.
    pub fn parse(value: &str) -> Result<Self, TaskDomainError> {
        let trimmed = value.trim();
        let Some((timestamp, suffix)) = trimmed.split_once('-') else {
            return Err(TaskDomainError::InvalidTaskId(value.to_owned()));
        };

        let timestamp_ok = timestamp.len() == Self::TIMESTAMP_LEN
            && timestamp.chars().all(|ch| ch.is_ascii_digit());
        let suffix_ok = !suffix.is_empty()
            && suffix.len() <= Self::MAX_SUFFIX_LEN
            && suffix
                .chars()
                .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit());

        if !(timestamp_ok && suffix_ok) {
            return Err(TaskDomainError::InvalidTaskId(value.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Builds an identifier from an allocation time and a random suffix.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTaskId`] when the suffix is not
    /// upper-case alphanumeric.
    pub fn from_parts(allocated_at: DateTime<Utc>, suffix: &str) -> Result<Self, TaskDomainError> {
        Self::parse(&format!("{}-{suffix}", Self::timestamp_prefix(allocated_at)))
    }

    /// Formats the 12-digit timestamp prefix for an allocation time.
    #[must_use]
    pub fn timestamp_prefix(allocated_at: DateTime<Utc>) -> String {
        allocated_at.format("%Y%m%d%H%M").to_string()
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a task identifier came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Allocated by the store.
    Generated,
    /// Supplied by the caller.
    Explicit,
}
