//! Filesystem helpers shared by the document store and the index cache.

use crate::task::ports::{TaskBackendError, TaskBackendResult};
use camino::Utf8Path;
use cap_std::fs_utf8::Dir;
use std::io;
use std::time::UNIX_EPOCH;
use uuid::Uuid;

/// Reads a file, mapping "not found" to `None`.
pub(super) fn read_optional(dir: &Dir, path: &Utf8Path) -> io::Result<Option<String>> {
    match dir.read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`, so
/// readers never observe a partially written file.
pub(crate) fn write_atomic(dir: &Dir, path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    write_atomic_stamped(dir, path, contents).map(|_| ())
}

/// Like [`write_atomic`], returning the modification time of the bytes that
/// were written.
///
/// The time is read from the temp file before the rename, which preserves it,
/// so a concurrent writer replacing `path` afterwards cannot leak its stamp
/// into ours.
pub(super) fn write_atomic_stamped(
    dir: &Dir,
    path: &Utf8Path,
    contents: &[u8],
) -> io::Result<i64> {
    let file_name = path.file_name().unwrap_or("document");
    let temp_name = format!(".{file_name}.{}.tmp", Uuid::new_v4().simple());
    let temp_path = path.parent().map_or_else(
        || Utf8Path::new(&temp_name).to_path_buf(),
        |parent| parent.join(&temp_name),
    );

    dir.write(&temp_path, contents)?;
    let stamped = modified_millis(dir, &temp_path).and_then(|mtime_millis| {
        dir.rename(&temp_path, dir, path)?;
        Ok(mtime_millis)
    });
    if stamped.is_err() {
        if let Err(cleanup) = dir.remove_file(&temp_path) {
            tracing::debug!(path = %temp_path, error = %cleanup, "failed to remove temp file");
        }
    }
    stamped
}

/// Returns a file's modification time in milliseconds since the epoch.
pub(super) fn modified_millis(dir: &Dir, path: &Utf8Path) -> io::Result<i64> {
    let modified = dir.metadata(path)?.modified()?.into_std();
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    Ok(i64::try_from(millis).unwrap_or(i64::MAX))
}

/// Runs blocking filesystem work off the async executor.
pub(super) async fn run_blocking<F, T>(f: F) -> TaskBackendResult<T>
where
    F: FnOnce() -> TaskBackendResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(TaskBackendError::io)?
}
