//! Tests for cleanup of claimed task directories.

use super::store::release_on_error;
use crate::task::domain::TaskId;
use crate::task::ports::TaskBackendError;
use cap_std::{ambient_authority, fs_utf8::Dir};
use rstest::{fixture, rstest};

struct Claimed {
    _guard: tempfile::TempDir,
    dir: Dir,
    id: TaskId,
}

#[fixture]
fn claimed() -> Claimed {
    let guard = tempfile::tempdir().expect("temp dir created");
    let path = camino::Utf8PathBuf::from_path_buf(guard.path().to_path_buf())
        .expect("UTF-8 temp path");
    let dir = Dir::open_ambient_dir(&path, ambient_authority()).expect("temp dir opens");
    let id = TaskId::parse("202601151230-CLAIM1").expect("valid id");
    dir.create_dir(id.as_str()).expect("task dir claimed");
    dir.write(format!("{}/.partial.tmp", id.as_str()), "half")
        .expect("partial file written");
    Claimed {
        _guard: guard,
        dir,
        id,
    }
}

#[rstest]
fn failed_creation_releases_claimed_directory(claimed: Claimed) {
    let failed: Result<(), TaskBackendError> =
        Err(TaskBackendError::AlreadyExists(claimed.id.clone()));

    let result = release_on_error(&claimed.dir, &claimed.id, failed);

    assert!(matches!(result, Err(TaskBackendError::AlreadyExists(_))));
    assert!(!claimed.dir.exists(claimed.id.as_str()));
}

#[rstest]
fn successful_creation_keeps_claimed_directory(claimed: Claimed) {
    let result = release_on_error(&claimed.dir, &claimed.id, Ok(7_u8));

    assert_eq!(result.ok(), Some(7));
    assert!(claimed.dir.is_dir(claimed.id.as_str()));
}
