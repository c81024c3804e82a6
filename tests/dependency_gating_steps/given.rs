//! Given steps for dependency gating BDD scenarios.

use super::world::{DependencyWorld, run_async, scenario_id};
use rstest_bdd_macros::given;
use taskplane::task::adapters::local::NewTask;

fn create(
    world: &DependencyWorld,
    id: &str,
    title: String,
    depends_on: Vec<String>,
) -> Result<(), eyre::Report> {
    let dependencies = depends_on
        .iter()
        .map(String::as_str)
        .map(scenario_id)
        .collect::<Result<Vec<_>, _>>()?;
    let new_task = NewTask::new(title)
        .with_id(scenario_id(id)?)
        .with_depends_on(dependencies)
        .created_by("planner");
    run_async(world.store.create_task(new_task))?;
    Ok(())
}

#[given(r#"task "{id}" titled "{title}" exists"#)]
fn task_exists(world: &mut DependencyWorld, id: String, title: String) -> Result<(), eyre::Report> {
    create(world, &id, title, Vec::new())
}

#[given(r#"task "{id}" titled "{title}" depends on "{dependency}""#)]
fn task_depends_on(
    world: &mut DependencyWorld,
    id: String,
    title: String,
    dependency: String,
) -> Result<(), eyre::Report> {
    create(world, &id, title, vec![dependency])
}

#[given(r#"task "{id}" has been started"#)]
fn task_started(world: &mut DependencyWorld, id: String) -> Result<(), eyre::Report> {
    let task_id = scenario_id(&id)?;
    run_async(world.service.start(&task_id, "builder", None))?;
    Ok(())
}

#[given(r#"task "{id}" has been finished"#)]
fn task_finished(world: &mut DependencyWorld, id: String) -> Result<(), eyre::Report> {
    let task_id = scenario_id(&id)?;
    run_async(world.service.start(&task_id, "builder", None))?;
    run_async(world.service.finish(&task_id, "builder", None, Some("built")))?;
    Ok(())
}
