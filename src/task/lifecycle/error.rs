//! Lifecycle rule violations.

use crate::task::domain::{TaskId, TaskStatus};
use thiserror::Error;

/// Result type for lifecycle checks.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors raised when a lifecycle rule rejects an operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The status change is not an allowed edge and was not forced.
    #[error("task {task_id}: transition {from} -> {to} is not allowed")]
    TransitionDenied {
        /// Task being transitioned.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// Dependencies are missing or not finished.
    #[error(
        "task {task_id}: dependencies not ready (missing: [{}], incomplete: [{}])",
        join_ids(.missing),
        join_ids(.incomplete)
    )]
    DependencyNotReady {
        /// Task being transitioned.
        task_id: TaskId,
        /// Dependencies absent from the task set.
        missing: Vec<TaskId>,
        /// Dependencies present but not `DONE`.
        incomplete: Vec<TaskId>,
    },

    /// An approval gate has not been passed.
    #[error("task {task_id}: {gate} is '{state}', approval required")]
    ApprovalRequired {
        /// Task being transitioned.
        task_id: TaskId,
        /// Gate name (`plan_approval` or `verification`).
        gate: &'static str,
        /// Current gate state.
        state: String,
    },
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
