//! Remote issue-tracker backend.
//!
//! Tasks are mirrored onto issues of a Redmine-style tracker. A custom field
//! carries the task id; an optional second field carries the rendered task
//! header so fields the tracker does not model survive a round trip.

mod backend;
mod http;
mod mapping;
mod memory;

pub use backend::{BatchPolicy, DUPLICATE_SAMPLE_LIMIT, RemoteTaskBackend};
pub use http::{API_KEY_HEADER, RedmineClient, RedmineClientConfig};
pub use mapping::{FieldMapping, issue_to_task, task_to_draft};
pub use memory::InMemoryIssueTracker;
