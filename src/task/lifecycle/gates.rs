//! Plan-approval and verification gates.

use super::{LifecycleError, LifecycleResult};
use crate::task::domain::{ApprovalState, TaskData, VerificationState};

/// Which gates the workflow enforces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatePolicy {
    /// Require `plan_approval.state == approved` before starting work.
    pub require_plan_approval: bool,
    /// Require `verification.state == ok` before finishing.
    pub require_verification: bool,
}

impl GatePolicy {
    /// Policy enforcing both gates.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            require_plan_approval: true,
            require_verification: true,
        }
    }
}

/// Checks the plan approval gate.
///
/// # Errors
///
/// Returns [`LifecycleError::ApprovalRequired`] unless the plan is approved.
pub fn ensure_plan_approved(task: &TaskData) -> LifecycleResult<()> {
    if task.plan_approval.state == ApprovalState::Approved {
        return Ok(());
    }
    Err(LifecycleError::ApprovalRequired {
        task_id: task.id.clone(),
        gate: "plan_approval",
        state: task.plan_approval.state.as_str().to_owned(),
    })
}

/// Checks the verification gate.
///
/// # Errors
///
/// Returns [`LifecycleError::ApprovalRequired`] unless verification is `ok`.
pub fn ensure_verified(task: &TaskData) -> LifecycleResult<()> {
    if task.verification.state == VerificationState::Ok {
        return Ok(());
    }
    Err(LifecycleError::ApprovalRequired {
        task_id: task.id.clone(),
        gate: "verification",
        state: task.verification.state.as_str().to_owned(),
    })
}
