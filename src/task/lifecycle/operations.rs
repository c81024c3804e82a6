//! State-changing lifecycle operations.
//!
//! Every operation takes the current task by value, returns the next one
//! and appends exactly one audit event. None of them touch `doc_version`;
//! stores stamp persisted mutations themselves.

use super::{LifecycleResult, check_transition, ensure_dependencies_ready};
use crate::task::domain::{
    ApprovalState, TaskComment, TaskCommit, TaskData, TaskEvent, TaskGate, TaskStatus,
    VerificationState,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    to: TaskStatus,
    actor: String,
    at: DateTime<Utc>,
    note: Option<String>,
    force: bool,
    skip_dependency_check: bool,
}

impl StatusChange {
    /// Creates an unforced status change.
    #[must_use]
    pub fn new(to: TaskStatus, actor: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            to,
            actor: actor.into(),
            at,
            note: None,
            force: false,
            skip_dependency_check: false,
        }
    }

    /// Attaches a note to the emitted event.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Admits edges outside the default transition graph.
    #[must_use]
    pub const fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Skips the dependency readiness check.
    #[must_use]
    pub const fn skipping_dependencies(mut self, skip: bool) -> Self {
        self.skip_dependency_check = skip;
        self
    }

    /// Returns the requested status.
    #[must_use]
    pub const fn to(&self) -> TaskStatus {
        self.to
    }
}

/// Applies a status change after checking the transition graph and the
/// dependency readiness of `task` against `tasks`.
///
/// # Errors
///
/// Returns `TransitionDenied` for an edge outside the graph and
/// `DependencyNotReady` when dependencies block the change.
pub fn transition(
    mut task: TaskData,
    change: &StatusChange,
    tasks: &[TaskData],
) -> LifecycleResult<TaskData> {
    check_transition(&task.id, task.status, change.to, change.force)?;
    ensure_dependencies_ready(&task, tasks, change.to, change.skip_dependency_check)?;

    let from = task.status;
    task.status = change.to;
    task.events.append(TaskEvent::status(
        change.at,
        change.actor.as_str(),
        from,
        change.to,
        change.note.clone(),
    ));
    task.doc_updated_by = Some(change.actor.clone());
    Ok(task)
}

/// Records a plan approval decision.
#[must_use]
pub fn set_plan_approval(
    mut task: TaskData,
    state: ApprovalState,
    actor: &str,
    note: Option<String>,
    at: DateTime<Utc>,
) -> TaskData {
    task.plan_approval = TaskGate::recorded(state, at, actor, note.clone());
    task.events.append(TaskEvent::plan_approval(at, actor, state, note));
    task.doc_updated_by = Some(actor.to_owned());
    task
}

/// Records a verification result.
#[must_use]
pub fn record_verification(
    mut task: TaskData,
    state: VerificationState,
    actor: &str,
    note: Option<String>,
    at: DateTime<Utc>,
) -> TaskData {
    task.verification = TaskGate::recorded(state, at, actor, note.clone());
    task.events.append(TaskEvent::verify(at, actor, state, note));
    task.doc_updated_by = Some(actor.to_owned());
    task
}

/// Appends a comment.
#[must_use]
pub fn add_comment(mut task: TaskData, author: &str, body: &str, at: DateTime<Utc>) -> TaskData {
    task.comments.push(TaskComment::new(author, body));
    task.events.append(TaskEvent::comment(at, author));
    task.doc_updated_by = Some(author.to_owned());
    task
}

/// Links a commit to the task.
#[must_use]
pub fn link_commit(
    mut task: TaskData,
    commit: TaskCommit,
    actor: &str,
    at: DateTime<Utc>,
) -> TaskData {
    task.events.append(
        TaskEvent::new("commit", at, actor, None)
            .with_field("hash", Value::from(commit.hash.as_str())),
    );
    task.commit = Some(commit);
    task.doc_updated_by = Some(actor.to_owned());
    task
}
