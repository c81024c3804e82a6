//! Application services for task workflow orchestration.

mod workflow;

pub use workflow::{
    PLAN_UPDATED_NOTE, TaskWorkflowError, TaskWorkflowResult, TaskWorkflowService,
};
