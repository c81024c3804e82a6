//! Port contracts for task storage.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod backend;
pub mod issue_tracker;

pub use backend::{
    BackendCapabilities, BackendKind, DuplicateTaskId, IdRequest, TaskBackend, TaskBackendError,
    TaskBackendResult, TaskMutation,
};
pub use issue_tracker::{
    CustomFieldValue, IssueDraft, IssuePage, IssueQuery, IssueTrackerClient, IssueTrackerError,
    IssueTrackerResult, NamedRef, RemoteIssue,
};
