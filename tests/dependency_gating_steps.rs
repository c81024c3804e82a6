//! Behaviour tests for dependency gating in the workflow service.

#[path = "dependency_gating_steps/mod.rs"]
mod dependency_gating_steps_defs;

use dependency_gating_steps_defs::world::{DependencyWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/dependency_gating.feature",
    name = "Starting a task with an unfinished dependency is refused"
)]
#[tokio::test(flavor = "multi_thread")]
async fn start_with_unfinished_dependency(world: DependencyWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_gating.feature",
    name = "Finishing the dependency unblocks the dependant"
)]
#[tokio::test(flavor = "multi_thread")]
async fn finished_dependency_unblocks(world: DependencyWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_gating.feature",
    name = "A dependency that does not exist is reported as missing"
)]
#[tokio::test(flavor = "multi_thread")]
async fn missing_dependency_reported(world: DependencyWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_gating.feature",
    name = "Forcing a status still checks dependencies"
)]
#[tokio::test(flavor = "multi_thread")]
async fn forced_status_checks_dependencies(world: DependencyWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_gating.feature",
    name = "Forcing a finished task back to the backlog"
)]
#[tokio::test(flavor = "multi_thread")]
async fn forced_reopen_of_finished_task(world: DependencyWorld) {
    let _ = world;
}
