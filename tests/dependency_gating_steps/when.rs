//! When steps for dependency gating BDD scenarios.

use super::world::{DependencyWorld, run_async, scenario_id};
use mockable::{Clock, DefaultClock};
use rstest_bdd_macros::when;
use taskplane::task::{domain::TaskStatus, lifecycle::StatusChange};

#[when(r#"the agent starts task "{id}""#)]
fn agent_starts(world: &mut DependencyWorld, id: String) -> Result<(), eyre::Report> {
    let task_id = scenario_id(&id)?;
    let result = run_async(world.service.start(&task_id, "agent", None));
    world.last_result = Some(result);
    Ok(())
}

#[when(r#"the lead forces task "{id}" to "{status}""#)]
fn lead_forces(
    world: &mut DependencyWorld,
    id: String,
    status: String,
) -> Result<(), eyre::Report> {
    let task_id = scenario_id(&id)?;
    let target = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let change = StatusChange::new(target, "lead", DefaultClock.utc())
        .with_note("manual override")
        .forced(true);
    let result = run_async(world.service.set_status(&task_id, change));
    world.last_result = Some(result);
    Ok(())
}
