//! Backend port shared by the local document store and remote mirrors.

use crate::task::{
    document::{DocumentError, TaskDocument},
    domain::{TaskData, TaskDomainError, TaskId},
    lifecycle::{LifecycleError, LifecycleResult},
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for backend operations.
pub type TaskBackendResult<T> = Result<T, TaskBackendError>;

/// Transformation applied to the freshest copy of a task document.
///
/// Backends may invoke it more than once when they detect a concurrent
/// write, so it must be a pure function of its input.
pub type TaskMutation<'a> =
    &'a (dyn Fn(TaskDocument) -> LifecycleResult<TaskDocument> + Send + Sync);

/// Which kind of storage sits behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Git-tracked document files.
    Local,
    /// Remote issue tracker.
    Remote,
}

/// Optional operations a backend supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    supports_bulk_write: bool,
    supports_id_generation: bool,
    supports_occ: bool,
}

impl BackendCapabilities {
    /// Creates capabilities with every optional operation disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            supports_bulk_write: false,
            supports_id_generation: false,
            supports_occ: false,
        }
    }

    /// Declares support for [`TaskBackend::write_tasks`].
    #[must_use]
    pub const fn with_bulk_write(mut self) -> Self {
        self.supports_bulk_write = true;
        self
    }

    /// Declares support for [`TaskBackend::generate_task_id`].
    #[must_use]
    pub const fn with_id_generation(mut self) -> Self {
        self.supports_id_generation = true;
        self
    }

    /// Declares that [`TaskBackend::update_task`] re-applies the mutation
    /// to fresh content when a concurrent write is detected.
    #[must_use]
    pub const fn with_occ(mut self) -> Self {
        self.supports_occ = true;
        self
    }

    /// Returns whether bulk writes are supported.
    #[must_use]
    pub const fn supports_bulk_write(&self) -> bool {
        self.supports_bulk_write
    }

    /// Returns whether the backend can allocate task ids.
    #[must_use]
    pub const fn supports_id_generation(&self) -> bool {
        self.supports_id_generation
    }

    /// Returns whether updates use optimistic concurrency control.
    #[must_use]
    pub const fn supports_occ(&self) -> bool {
        self.supports_occ
    }
}

/// Parameters for task id allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRequest {
    /// Length of the random suffix.
    pub suffix_length: usize,
    /// Candidates tried before giving up.
    pub attempts: usize,
}

impl Default for IdRequest {
    fn default() -> Self {
        Self {
            suffix_length: 6,
            attempts: 1000,
        }
    }
}

/// Task storage contract consumed by the workflow layer.
///
/// Required methods cover listing, lookup and single writes. Optional
/// operations are advertised through [`TaskBackend::capabilities`]; their
/// default implementations fail with [`TaskBackendError::Unsupported`].
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Returns the storage kind.
    fn kind(&self) -> BackendKind;

    /// Returns the optional operations this backend supports.
    fn capabilities(&self) -> BackendCapabilities;

    /// Lists every task, ordered by id.
    async fn list_tasks(&self) -> TaskBackendResult<Vec<TaskData>>;

    /// Finds a task by id.
    ///
    /// Returns `None` when the task does not exist.
    async fn get_task(&self, id: &TaskId) -> TaskBackendResult<Option<TaskData>>;

    /// Writes a task, creating it when absent.
    ///
    /// This is a blind write; mutations of existing tasks should go through
    /// [`TaskBackend::update_task`].
    async fn write_task(&self, task: &TaskData) -> TaskBackendResult<()>;

    /// Reads a task, applies `mutation` and persists the result.
    ///
    /// Returns the persisted task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBackendError::NotFound`] when the task does not exist
    /// and [`TaskBackendError::Rejected`] when the mutation fails.
    async fn update_task(
        &self,
        id: &TaskId,
        mutation: TaskMutation<'_>,
    ) -> TaskBackendResult<TaskData>;

    /// Writes several tasks.
    async fn write_tasks(&self, tasks: &[TaskData]) -> TaskBackendResult<()> {
        let _ = tasks;
        Err(TaskBackendError::Unsupported("bulk write"))
    }

    /// Allocates a task id unused by this backend.
    async fn generate_task_id(&self, request: IdRequest) -> TaskBackendResult<TaskId> {
        let _ = request;
        Err(TaskBackendError::Unsupported("id generation"))
    }
}

/// A task id shared by several remote issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateTaskId {
    /// The duplicated task id value.
    pub task_id: String,
    /// Issues carrying it.
    pub issue_ids: Vec<u64>,
}

impl fmt::Display for DuplicateTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues = self
            .issue_ids
            .iter()
            .map(|issue_id| format!("#{issue_id}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} (issues {issues})", self.task_id)
    }
}

/// Errors returned by task backends.
#[derive(Debug, Clone, Error)]
pub enum TaskBackendError {
    /// The task id is unknown to the backend.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// A task with this id already exists.
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),

    /// A mutation tried to change the task id.
    #[error("mutation changed task id from {expected} to {actual}")]
    IdChanged {
        /// Id of the task being updated.
        expected: TaskId,
        /// Id returned by the mutation.
        actual: TaskId,
    },

    /// A stored document could not be parsed or rendered.
    #[error("{path}: {source}")]
    Document {
        /// Document location.
        path: String,
        /// Codec failure.
        source: DocumentError,
    },

    /// Every optimistic concurrency attempt saw a concurrent write.
    #[error("{path}: document changed during update on all {attempts} attempts")]
    ConflictExceeded {
        /// Contended document.
        path: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Several remote issues carry the same task id.
    #[error(
        "duplicate task ids across remote issues ({total} affected): {}",
        join_duplicates(.sample)
    )]
    DuplicateIdentifier {
        /// Bounded sample of offending ids.
        sample: Vec<DuplicateTaskId>,
        /// Number of duplicated ids.
        total: usize,
    },

    /// The remote service failed or could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No unused id was found within the attempt budget.
    #[error("could not allocate a unique task id after {attempts} attempts")]
    IdAllocation {
        /// Candidates tried.
        attempts: usize,
    },

    /// A task value violated a domain rule.
    #[error(transparent)]
    InvalidTask(#[from] TaskDomainError),

    /// The mutation rejected the change.
    #[error(transparent)]
    Rejected(#[from] LifecycleError),

    /// The backend does not implement the operation.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskBackendError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Wraps a codec error for the document at `path`.
    pub fn document(path: impl Into<String>, source: DocumentError) -> Self {
        Self::Document {
            path: path.into(),
            source,
        }
    }
}

fn join_duplicates(sample: &[DuplicateTaskId]) -> String {
    sample
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
