//! Status state machine.

use super::{LifecycleError, LifecycleResult};
use crate::task::domain::{TaskId, TaskStatus};

impl TaskStatus {
    /// Returns `true` when `self -> next` is an edge of the default
    /// transition graph.
    ///
    /// Same-state transitions are not edges.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Todo | Self::Blocked, Self::Doing) | (Self::Doing, Self::Blocked | Self::Done)
        )
    }
}

/// Checks a status change against the transition graph.
///
/// `force` admits any edge, including same-state ones. It has no effect on
/// dependency or approval checks.
///
/// # Errors
///
/// Returns [`LifecycleError::TransitionDenied`] for a disallowed, unforced
/// edge.
pub fn check_transition(
    task_id: &TaskId,
    from: TaskStatus,
    to: TaskStatus,
    force: bool,
) -> LifecycleResult<()> {
    if force || from.can_transition_to(to) {
        return Ok(());
    }
    Err(LifecycleError::TransitionDenied {
        task_id: task_id.clone(),
        from,
        to,
    })
}
