//! Conversion between remote issues and task records.

use crate::task::{
    document::{DocumentError, DocumentResult, TaskDocument, render_document, task_header},
    domain::{TaskData, TaskId, TaskStatus},
    ports::{CustomFieldValue, IssueDraft, NamedRef, RemoteIssue, TaskBackendError},
};
use serde_json::json;
use std::collections::BTreeMap;

/// Tracker field ids and status mapping used by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// Custom field holding the task id.
    pub task_id_field: u64,
    /// Custom field holding the rendered task header.
    pub doc_field: Option<u64>,
    /// Tracker status id per task status.
    pub status_map: BTreeMap<TaskStatus, u64>,
}

impl FieldMapping {
    /// Creates a mapping with only the task id field.
    #[must_use]
    pub const fn new(task_id_field: u64) -> Self {
        Self {
            task_id_field,
            doc_field: None,
            status_map: BTreeMap::new(),
        }
    }

    /// Sets the field that carries the rendered header.
    #[must_use]
    pub const fn with_doc_field(mut self, field_id: u64) -> Self {
        self.doc_field = Some(field_id);
        self
    }

    /// Maps a task status to a tracker status id.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus, tracker_status: u64) -> Self {
        self.status_map.insert(status, tracker_status);
        self
    }

    /// Returns the tracker status id for a task status.
    #[must_use]
    pub fn tracker_status(&self, status: TaskStatus) -> Option<u64> {
        self.status_map.get(&status).copied()
    }

    /// Returns the task status mapped to a tracker status id.
    #[must_use]
    pub fn task_status(&self, tracker_status: u64) -> Option<TaskStatus> {
        self.status_map
            .iter()
            .find(|(_, id)| **id == tracker_status)
            .map(|(status, _)| *status)
    }

    /// Returns the raw task id carried by an issue.
    #[must_use]
    pub fn raw_task_id<'a>(&self, issue: &'a RemoteIssue) -> Option<&'a str> {
        issue
            .custom_field(self.task_id_field)
            .and_then(CustomFieldValue::as_text)
    }
}

/// Maps an issue onto a task record.
///
/// Returns `Ok(None)` for issues without a task id. When the mapping has a
/// document field and the issue carries one, the header stored there is
/// the base record; the tracker's subject wins over it, and so does its
/// mapped status unless the stored status has no tracker counterpart.
///
/// # Errors
///
/// Returns [`TaskBackendError::InvalidTask`] for an unparseable task id and
/// [`TaskBackendError::Document`] for a corrupt document field.
pub fn issue_to_task(
    issue: &RemoteIssue,
    mapping: &FieldMapping,
) -> Result<Option<TaskData>, TaskBackendError> {
    let Some(raw_id) = mapping.raw_task_id(issue) else {
        return Ok(None);
    };
    let id = TaskId::parse(raw_id)?;
    let location = format!("issue #{}", issue.id);

    let stored_doc = mapping
        .doc_field
        .and_then(|field| issue.custom_field(field))
        .and_then(CustomFieldValue::as_text);

    let mut task = if let Some(text) = stored_doc {
        let document =
            TaskDocument::parse(text).map_err(|err| TaskBackendError::document(&location, err))?;
        if document.task.id != id {
            return Err(TaskBackendError::document(
                location,
                DocumentError::malformed(format!(
                    "document field holds task {} but task id field says {id}",
                    document.task.id
                )),
            ));
        }
        document.task
    } else {
        let title = if issue.subject.trim().is_empty() {
            id.to_string()
        } else {
            issue.subject.clone()
        };
        let mut fresh = TaskData::new(id, title)?;
        fresh.description = issue.description.clone().unwrap_or_default();
        if let Some(priority) = &issue.priority {
            fresh.priority = priority.name.to_lowercase();
        }
        if let Some(assignee) = &issue.assigned_to {
            fresh.owner.clone_from(&assignee.name);
        }
        fresh.origin = Some(json!({ "system": "redmine", "issue_id": issue.id }));
        fresh
    };

    if !issue.subject.trim().is_empty() {
        issue.subject.trim().clone_into(&mut task.title);
    }
    // A stored status with no tracker id was never sent, so the tracker
    // still shows whatever was last mapped and must not win.
    let tracker_owns_status =
        stored_doc.is_none() || mapping.tracker_status(task.status).is_some();
    if let Some(status) = issue
        .status
        .as_ref()
        .and_then(|status| mapping.task_status(status.id))
        .filter(|_| tracker_owns_status)
    {
        task.status = status;
    }
    Ok(Some(task.normalized()))
}

/// Builds the issue fields for a task.
///
/// # Errors
///
/// Returns [`DocumentError`] when the header cannot be rendered for the
/// document field.
pub fn task_to_draft(task: &TaskData, mapping: &FieldMapping) -> DocumentResult<IssueDraft> {
    let mut custom_fields = vec![CustomFieldValue::text(
        mapping.task_id_field,
        task.id.as_str(),
    )];
    if let Some(field) = mapping.doc_field {
        let header = render_document(&task_header(task)?, "")?;
        custom_fields.push(CustomFieldValue::text(field, header));
    }

    Ok(IssueDraft {
        subject: task.title.clone(),
        description: task.description.clone(),
        status_id: mapping.tracker_status(task.status),
        custom_fields,
    })
}

/// Applies draft fields to a known issue, as the tracker would.
pub(super) fn apply_draft(mut issue: RemoteIssue, draft: &IssueDraft) -> RemoteIssue {
    issue.subject.clone_from(&draft.subject);
    issue.description = Some(draft.description.clone());
    if let Some(status_id) = draft.status_id {
        issue.status = Some(NamedRef {
            id: status_id,
            name: String::new(),
        });
    }
    for field in &draft.custom_fields {
        match issue
            .custom_fields
            .iter_mut()
            .find(|existing| existing.id == field.id)
        {
            Some(existing) => existing.value = field.value.clone(),
            None => issue.custom_fields.push(field.clone()),
        }
    }
    issue
}
