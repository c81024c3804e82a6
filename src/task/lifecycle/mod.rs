//! Task lifecycle rules.
//!
//! Pure functions over [`TaskData`](crate::task::domain::TaskData): the
//! status state machine, dependency readiness and the approval gates. No
//! function in this module performs I/O or retries; callers decide whether
//! a transition is legal before any backend write happens.

mod error;
mod gates;
mod operations;
mod readiness;
mod transitions;

pub use error::{LifecycleError, LifecycleResult};
pub use gates::{GatePolicy, ensure_plan_approved, ensure_verified};
pub use operations::{
    StatusChange, add_comment, link_commit, record_verification, set_plan_approval, transition,
};
pub use readiness::{
    DependencyReadiness, dependency_readiness, ensure_dependencies_ready, ready_tasks,
};
pub use transitions::check_transition;
