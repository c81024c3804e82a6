//! Then steps for dependency gating BDD scenarios.

use super::world::{DependencyWorld, run_async, scenario_id};
use rstest_bdd_macros::then;
use taskplane::task::{
    domain::{TaskId, TaskStatus},
    lifecycle::LifecycleError,
    services::TaskWorkflowError,
};

fn readiness_failure(world: &DependencyWorld) -> Result<(&[TaskId], &[TaskId]), eyre::Report> {
    let result = world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing command result"))?;
    match result {
        Err(TaskWorkflowError::Lifecycle(LifecycleError::DependencyNotReady {
            missing,
            incomplete,
            ..
        })) => Ok((missing, incomplete)),
        other => Err(eyre::eyre!("expected a dependency error, got {other:?}")),
    }
}

#[then(r#"the command fails listing "{id}" as incomplete"#)]
fn fails_with_incomplete(world: &DependencyWorld, id: String) -> Result<(), eyre::Report> {
    let expected = scenario_id(&id)?;
    let (missing, incomplete) = readiness_failure(world)?;
    if incomplete != [expected] || !missing.is_empty() {
        return Err(eyre::eyre!(
            "expected only {id} incomplete, got missing {missing:?} incomplete {incomplete:?}"
        ));
    }
    Ok(())
}

#[then(r#"the command fails listing "{id}" as missing"#)]
fn fails_with_missing(world: &DependencyWorld, id: String) -> Result<(), eyre::Report> {
    let expected = scenario_id(&id)?;
    let (missing, incomplete) = readiness_failure(world)?;
    if missing != [expected] || !incomplete.is_empty() {
        return Err(eyre::eyre!(
            "expected only {id} missing, got missing {missing:?} incomplete {incomplete:?}"
        ));
    }
    Ok(())
}

#[then("the command succeeds")]
fn command_succeeds(world: &DependencyWorld) -> Result<(), eyre::Report> {
    match &world.last_result {
        Some(Ok(_)) => Ok(()),
        Some(Err(err)) => Err(eyre::eyre!("expected success, got {err}")),
        None => Err(eyre::eyre!("missing command result")),
    }
}

#[then(r#"task "{id}" has status "{status}""#)]
fn task_has_status(
    world: &DependencyWorld,
    id: String,
    status: String,
) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let task = run_async(world.store.get(&scenario_id(&id)?))?;
    if task.status != expected {
        return Err(eyre::eyre!(
            "expected {id} to be {expected}, found {}",
            task.status
        ));
    }
    Ok(())
}
