//! Shared fixtures for task unit tests.

use crate::task::domain::{TaskData, TaskId, TaskStatus};
use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub(super) struct FixedClock(pub(super) DateTime<Utc>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(super) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
        .single()
        .expect("fixed test time should be unambiguous")
}

pub(super) fn task_id(raw: &str) -> TaskId {
    TaskId::parse(raw).expect("test task id should be valid")
}

pub(super) fn task(raw_id: &str, title: &str, status: TaskStatus) -> TaskData {
    let mut task = TaskData::new(task_id(raw_id), title).expect("test task should be valid");
    task.status = status;
    task
}

/// Temporary directory opened as a capability handle.
pub(super) struct TempRoot {
    _guard: tempfile::TempDir,
    pub(super) path: camino::Utf8PathBuf,
}

impl TempRoot {
    pub(super) fn new() -> Self {
        let guard = tempfile::tempdir().expect("temp dir should be created");
        let path = camino::Utf8PathBuf::from_path_buf(guard.path().to_path_buf())
            .expect("temp dir path should be UTF-8");
        Self {
            _guard: guard,
            path,
        }
    }

    pub(super) fn dir(&self) -> cap_std::fs_utf8::Dir {
        cap_std::fs_utf8::Dir::open_ambient_dir(&self.path, cap_std::ambient_authority())
            .expect("temp dir should open")
    }
}
