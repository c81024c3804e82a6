//! Issue tracker port used by the remote task backend.
//!
//! The wire shape follows Redmine's JSON API: paginated issue lists with
//! `total_count`/`offset`/`limit`, and per-issue custom fields keyed by
//! numeric field ids.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type for issue tracker calls.
pub type IssueTrackerResult<T> = Result<T, IssueTrackerError>;

/// `{ id, name }` reference used for statuses, priorities and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Tracker-side id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Custom field value attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    /// Field id.
    pub id: u64,
    /// Field name, as reported by the tracker.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Field value; usually a string, sometimes a list or null.
    #[serde(default)]
    pub value: Value,
}

impl CustomFieldValue {
    /// Creates a string-valued field.
    #[must_use]
    pub fn text(id: u64, value: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            value: Value::String(value.into()),
        }
    }

    /// Returns the value as a non-empty trimmed string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.value
            .as_str()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// An issue as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIssue {
    /// Tracker issue number.
    pub id: u64,
    /// Issue subject.
    #[serde(default)]
    pub subject: String,
    /// Issue description.
    #[serde(default)]
    pub description: Option<String>,
    /// Issue status.
    #[serde(default)]
    pub status: Option<NamedRef>,
    /// Issue priority.
    #[serde(default)]
    pub priority: Option<NamedRef>,
    /// Assignee.
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    /// Custom field values.
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

impl RemoteIssue {
    /// Returns a custom field by id.
    #[must_use]
    pub fn custom_field(&self, field_id: u64) -> Option<&CustomFieldValue> {
        self.custom_fields.iter().find(|field| field.id == field_id)
    }
}

/// One page of an issue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePage {
    /// Issues on this page.
    pub issues: Vec<RemoteIssue>,
    /// Total matching issues across all pages.
    pub total_count: u64,
    /// Offset of this page.
    #[serde(default)]
    pub offset: u64,
    /// Page size used by the tracker.
    #[serde(default)]
    pub limit: u64,
}

/// Listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    /// Number of issues to skip.
    pub offset: u64,
    /// Page size.
    pub limit: u64,
    /// Restrict to issues whose custom field equals a value.
    pub custom_field: Option<(u64, String)>,
}

impl IssueQuery {
    /// Creates an unfiltered page query.
    #[must_use]
    pub const fn page(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            custom_field: None,
        }
    }

    /// Restricts the query to one custom field value.
    #[must_use]
    pub fn with_custom_field(mut self, field_id: u64, value: impl Into<String>) -> Self {
        self.custom_field = Some((field_id, value.into()));
        self
    }
}

/// Fields sent when creating or updating an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDraft {
    /// Issue subject.
    pub subject: String,
    /// Issue description.
    pub description: String,
    /// Tracker status id, when mapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u64>,
    /// Custom field values.
    pub custom_fields: Vec<CustomFieldValue>,
}

/// Issue tracker client contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueTrackerClient: Send + Sync {
    /// Fetches one page of issues.
    async fn list_issues(&self, query: &IssueQuery) -> IssueTrackerResult<IssuePage>;

    /// Creates an issue and returns it as stored by the tracker.
    async fn create_issue(&self, draft: &IssueDraft) -> IssueTrackerResult<RemoteIssue>;

    /// Updates an existing issue.
    async fn update_issue(&self, issue_id: u64, draft: &IssueDraft) -> IssueTrackerResult<()>;
}

/// Errors returned by issue tracker clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IssueTrackerError {
    /// The tracker answered with a non-success status.
    #[error("tracker returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The request could not be sent or timed out.
    #[error("tracker request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected tracker response: {0}")]
    Decode(String),

    /// The referenced issue does not exist.
    #[error("issue #{0} not found")]
    IssueNotFound(u64),
}
