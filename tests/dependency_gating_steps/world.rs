//! Shared world state for dependency gating BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use rstest::fixture;
use taskplane::task::{
    adapters::local::LocalTaskStore,
    domain::{TaskData, TaskId},
    services::{TaskWorkflowError, TaskWorkflowService},
};
use tempfile::TempDir;

/// Store type used by the BDD world.
pub type TestStore = LocalTaskStore<DefaultClock>;

/// Service type used by the BDD world.
pub type TestWorkflowService = TaskWorkflowService<TestStore, DefaultClock>;

/// Scenario world for dependency gating behaviour tests.
pub struct DependencyWorld {
    _checkout: TempDir,
    pub store: Arc<TestStore>,
    pub service: TestWorkflowService,
    pub last_result: Option<Result<TaskData, TaskWorkflowError>>,
}

impl DependencyWorld {
    /// Creates a world over an empty task directory.
    #[expect(
        clippy::expect_used,
        reason = "Scenario setup failures should abort the test immediately"
    )]
    #[must_use]
    pub fn new() -> Self {
        let checkout = tempfile::tempdir().expect("temp dir created");
        let root = Utf8PathBuf::from_path_buf(checkout.path().join("tasks"))
            .expect("UTF-8 temp path");
        let clock = Arc::new(DefaultClock);
        let store = Arc::new(LocalTaskStore::open(&root, Arc::clone(&clock)).expect("store opens"));
        let service = TaskWorkflowService::new(Arc::clone(&store), clock);

        Self {
            _checkout: checkout,
            store,
            service,
            last_result: None,
        }
    }
}

impl Default for DependencyWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> DependencyWorld {
    DependencyWorld::default()
}

/// Parses a task id written in a scenario.
pub fn scenario_id(raw: &str) -> Result<TaskId, eyre::Report> {
    TaskId::parse(raw).map_err(|err| eyre::eyre!("invalid task id in scenario: {err}"))
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
