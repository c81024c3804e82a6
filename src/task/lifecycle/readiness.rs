//! Dependency readiness.

use super::{LifecycleError, LifecycleResult};
use crate::task::domain::{TaskData, TaskId, TaskStatus};
use std::collections::{BTreeSet, HashMap};

/// Dependency state of a task relative to a task set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReadiness {
    /// Dependencies absent from the task set.
    pub missing: BTreeSet<TaskId>,
    /// Dependencies present but not `DONE`.
    pub incomplete: BTreeSet<TaskId>,
}

impl DependencyReadiness {
    /// Returns `true` when every dependency exists and is `DONE`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty() && self.incomplete.is_empty()
    }
}

/// Computes which dependencies of `task` are missing or unfinished.
#[must_use]
pub fn dependency_readiness(task: &TaskData, tasks: &[TaskData]) -> DependencyReadiness {
    let statuses: HashMap<&TaskId, TaskStatus> =
        tasks.iter().map(|other| (&other.id, other.status)).collect();
    readiness_against(task, &statuses)
}

fn readiness_against(
    task: &TaskData,
    statuses: &HashMap<&TaskId, TaskStatus>,
) -> DependencyReadiness {
    let mut readiness = DependencyReadiness::default();
    for dependency in task.depends_on.iter().filter(|id| **id != task.id) {
        match statuses.get(dependency) {
            None => {
                readiness.missing.insert(dependency.clone());
            }
            Some(TaskStatus::Done) => {}
            Some(_) => {
                readiness.incomplete.insert(dependency.clone());
            }
        }
    }
    readiness
}

/// Rejects moving `task` to `DOING` or `DONE` while dependencies are not
/// ready. Other targets, and `skip`, always pass.
///
/// # Errors
///
/// Returns [`LifecycleError::DependencyNotReady`] listing missing and
/// incomplete dependencies separately.
pub fn ensure_dependencies_ready(
    task: &TaskData,
    tasks: &[TaskData],
    target: TaskStatus,
    skip: bool,
) -> LifecycleResult<()> {
    if skip || !matches!(target, TaskStatus::Doing | TaskStatus::Done) {
        return Ok(());
    }
    let readiness = dependency_readiness(task, tasks);
    if readiness.is_ready() {
        return Ok(());
    }
    Err(LifecycleError::DependencyNotReady {
        task_id: task.id.clone(),
        missing: readiness.missing.into_iter().collect(),
        incomplete: readiness.incomplete.into_iter().collect(),
    })
}

/// Returns the `TODO` tasks whose dependencies are all `DONE`, in input
/// order.
#[must_use]
pub fn ready_tasks(tasks: &[TaskData]) -> Vec<&TaskData> {
    let statuses: HashMap<&TaskId, TaskStatus> =
        tasks.iter().map(|task| (&task.id, task.status)).collect();
    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Todo)
        .filter(|task| readiness_against(task, &statuses).is_ready())
        .collect()
}
