//! Domain model for repository-resident tasks.
//!
//! The task domain models the canonical in-memory task record, its status
//! and approval gates, and the append-only audit log, while keeping all
//! storage concerns outside of the domain boundary.

mod error;
mod event;
mod gate;
mod ids;
mod status;
mod task;

pub use error::{ParseTaskStatusError, TaskDomainError};
pub use event::{TaskEvent, TaskEventKind, TaskEvents};
pub use gate::{ApprovalState, PlanApproval, TaskGate, Verification, VerificationState};
pub use ids::{IdSource, TaskId};
pub use status::TaskStatus;
pub use task::{TaskComment, TaskCommit, TaskData};
