//! Workflow commands built on the lifecycle engine and a task backend.

use crate::task::{
    document::{
        TaskDocument,
        sections::{PLAN_SECTION, VERIFICATION_SECTION, set_section},
    },
    domain::{ApprovalState, TaskCommit, TaskData, TaskId, TaskStatus, VerificationState},
    lifecycle::{
        self, GatePolicy, LifecycleError, LifecycleResult, StatusChange, ensure_plan_approved,
        ensure_verified,
    },
    ports::{BackendKind, TaskBackend, TaskBackendError},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for workflow commands.
#[derive(Debug, Clone, Error)]
pub enum TaskWorkflowError {
    /// A lifecycle rule rejected the command.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The backend failed.
    #[error(transparent)]
    Backend(TaskBackendError),
}

impl From<TaskBackendError> for TaskWorkflowError {
    fn from(err: TaskBackendError) -> Self {
        match err {
            TaskBackendError::Rejected(rule) => Self::Lifecycle(rule),
            other => Self::Backend(other),
        }
    }
}

/// Note recorded on the approval gate when the plan is replaced.
pub const PLAN_UPDATED_NOTE: &str = "plan updated";

/// Result type for workflow commands.
pub type TaskWorkflowResult<T> = Result<T, TaskWorkflowError>;

/// Orchestrates task workflow commands.
///
/// Every command is expressed as a pure mutation handed to
/// [`TaskBackend::update_task`], so backends with optimistic concurrency
/// re-run it against fresh content on conflict.
pub struct TaskWorkflowService<B, C>
where
    B: TaskBackend + ?Sized,
    C: Clock + Send + Sync,
{
    backend: Arc<B>,
    clock: Arc<C>,
    gates: GatePolicy,
}

impl<B, C> Clone for TaskWorkflowService<B, C>
where
    B: TaskBackend + ?Sized,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
            gates: self.gates,
        }
    }
}

impl<B, C> TaskWorkflowService<B, C>
where
    B: TaskBackend + ?Sized,
    C: Clock + Send + Sync,
{
    /// Creates a service with no approval gates enforced.
    #[must_use]
    pub fn new(backend: Arc<B>, clock: Arc<C>) -> Self {
        Self {
            backend,
            clock,
            gates: GatePolicy::default(),
        }
    }

    /// Sets which approval gates `start` and `finish` enforce.
    #[must_use]
    pub const fn with_gate_policy(mut self, gates: GatePolicy) -> Self {
        self.gates = gates;
        self
    }

    /// Moves a task to `DOING`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Lifecycle`] when the transition, a
    /// dependency or the plan gate forbids it.
    pub async fn start(
        &self,
        id: &TaskId,
        actor: &str,
        note: Option<&str>,
    ) -> TaskWorkflowResult<TaskData> {
        let change = with_optional_note(
            StatusChange::new(TaskStatus::Doing, actor, self.now()),
            note,
        );
        self.set_status(id, change).await
    }

    /// Moves a task to `BLOCKED`, recording the reason.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Lifecycle`] unless the task is `DOING`.
    pub async fn block(
        &self,
        id: &TaskId,
        actor: &str,
        reason: &str,
    ) -> TaskWorkflowResult<TaskData> {
        let change = StatusChange::new(TaskStatus::Blocked, actor, self.now()).with_note(reason);
        self.set_status(id, change).await
    }

    /// Moves a task to `DONE`, optionally linking the finishing commit.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Lifecycle`] when the transition, a
    /// dependency or the verification gate forbids it.
    pub async fn finish(
        &self,
        id: &TaskId,
        actor: &str,
        commit: Option<TaskCommit>,
        note: Option<&str>,
    ) -> TaskWorkflowResult<TaskData> {
        let at = self.now();
        let change = with_optional_note(StatusChange::new(TaskStatus::Done, actor, at), note);
        let tasks = self.backend.list_tasks().await?;
        let gates = self.gates;

        self.apply(id, |mut document| {
            document.task = guarded_transition(document.task, &change, &tasks, gates)?;
            if let Some(linked) = &commit {
                document.task = lifecycle::link_commit(document.task, linked.clone(), actor, at);
            }
            Ok(document)
        })
        .await
    }

    /// Applies an arbitrary status change.
    ///
    /// A forced change admits edges outside the transition graph; the
    /// dependency check and the configured gates still apply.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Lifecycle`] when a rule forbids the
    /// change.
    pub async fn set_status(
        &self,
        id: &TaskId,
        change: StatusChange,
    ) -> TaskWorkflowResult<TaskData> {
        let tasks = self.backend.list_tasks().await?;
        let gates = self.gates;
        self.apply(id, |mut document| {
            document.task = guarded_transition(document.task, &change, &tasks, gates)?;
            Ok(document)
        })
        .await
    }

    /// Appends a comment.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Backend`] when the task cannot be
    /// updated.
    pub async fn add_comment(
        &self,
        id: &TaskId,
        author: &str,
        body: &str,
    ) -> TaskWorkflowResult<TaskData> {
        let at = self.now();
        self.apply(id, |mut document| {
            document.task = lifecycle::add_comment(document.task, author, body, at);
            Ok(document)
        })
        .await
    }

    /// Approves the task plan.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Backend`] when the task cannot be
    /// updated.
    pub async fn approve_plan(
        &self,
        id: &TaskId,
        actor: &str,
        note: Option<&str>,
    ) -> TaskWorkflowResult<TaskData> {
        self.decide_plan(id, ApprovalState::Approved, actor, note).await
    }

    /// Rejects the task plan.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Backend`] when the task cannot be
    /// updated.
    pub async fn reject_plan(
        &self,
        id: &TaskId,
        actor: &str,
        note: Option<&str>,
    ) -> TaskWorkflowResult<TaskData> {
        self.decide_plan(id, ApprovalState::Rejected, actor, note).await
    }

    /// Replaces the Plan section of the body.
    ///
    /// A new plan has not been reviewed, so any earlier approval or
    /// rejection is reset to pending.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Backend`] when the task cannot be
    /// updated.
    pub async fn set_plan(
        &self,
        id: &TaskId,
        actor: &str,
        plan: &str,
    ) -> TaskWorkflowResult<TaskData> {
        let at = self.now();
        self.apply(id, |mut document| {
            document.body = set_section(&document.body, PLAN_SECTION, plan);
            document.task = lifecycle::set_plan_approval(
                document.task,
                ApprovalState::Pending,
                actor,
                Some(PLAN_UPDATED_NOTE.to_owned()),
                at,
            );
            Ok(document)
        })
        .await
    }

    /// Records a verification result. On local backends the Verification
    /// section of the body is rewritten with the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`TaskWorkflowError::Backend`] when the task cannot be
    /// updated.
    pub async fn record_verification(
        &self,
        id: &TaskId,
        actor: &str,
        state: VerificationState,
        note: Option<&str>,
    ) -> TaskWorkflowResult<TaskData> {
        let at = self.now();
        let rewrite_body = self.backend.kind() == BackendKind::Local;
        self.apply(id, |mut document| {
            document.task = lifecycle::record_verification(
                document.task,
                state,
                actor,
                note.map(str::to_owned),
                at,
            );
            if rewrite_body {
                document.body = set_section(
                    &document.body,
                    VERIFICATION_SECTION,
                    &verification_summary(state, actor, at, note),
                );
            }
            Ok(document)
        })
        .await
    }

    async fn decide_plan(
        &self,
        id: &TaskId,
        state: ApprovalState,
        actor: &str,
        note: Option<&str>,
    ) -> TaskWorkflowResult<TaskData> {
        let at = self.now();
        self.apply(id, |mut document| {
            document.task = lifecycle::set_plan_approval(
                document.task,
                state,
                actor,
                note.map(str::to_owned),
                at,
            );
            Ok(document)
        })
        .await
    }

    async fn apply<F>(&self, id: &TaskId, mutate: F) -> TaskWorkflowResult<TaskData>
    where
        F: Fn(TaskDocument) -> LifecycleResult<TaskDocument> + Send + Sync,
    {
        Ok(self.backend.update_task(id, &mutate).await?)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }
}

fn with_optional_note(change: StatusChange, note: Option<&str>) -> StatusChange {
    match note {
        Some(text) => change.with_note(text),
        None => change,
    }
}

fn guarded_transition(
    task: TaskData,
    change: &StatusChange,
    tasks: &[TaskData],
    gates: GatePolicy,
) -> LifecycleResult<TaskData> {
    match change.to() {
        TaskStatus::Doing if gates.require_plan_approval => ensure_plan_approved(&task)?,
        TaskStatus::Done if gates.require_verification => ensure_verified(&task)?,
        _ => {}
    }
    lifecycle::transition(task, change, tasks)
}

fn verification_summary(
    state: VerificationState,
    actor: &str,
    at: DateTime<Utc>,
    note: Option<&str>,
) -> String {
    let mut summary = format!(
        "- state: {state}\n- by: {actor}\n- at: {}",
        at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );
    if let Some(text) = note.map(str::trim).filter(|text| !text.is_empty()) {
        summary.push_str("\n\n");
        summary.push_str(text);
    }
    summary
}
