//! Error types for task domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task identifier does not follow `<12 digits>-<suffix>`.
    #[error("invalid task id '{0}', expected <YYYYMMDDHHMM>-<SUFFIX>")]
    InvalidTaskId(String),

    /// The requested identifier suffix length is unusable.
    #[error(
        "invalid task id suffix length {0}, expected 1..={max}",
        max = super::TaskId::MAX_SUFFIX_LEN
    )]
    InvalidSuffixLength(usize),

    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,
}

/// Error returned while parsing task statuses from documents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);
