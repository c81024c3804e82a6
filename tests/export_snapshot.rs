//! Integration tests for exporting a task snapshot from the local store.

#![expect(
    clippy::expect_used,
    reason = "Test code uses expect for assertion clarity"
)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;
use taskplane::task::{
    adapters::local::{LocalTaskStore, NewTask},
    export::{EXPORT_SCHEMA_VERSION, TaskSnapshot, build_snapshot, write_snapshot},
    ports::TaskBackend,
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn exported_snapshot_matches_store_listing() {
    let guard = tempfile::tempdir().expect("temp dir created");
    let root = Utf8PathBuf::from_path_buf(guard.path().to_path_buf()).expect("UTF-8 temp path");
    let store = LocalTaskStore::open(&root.join("tasks"), Arc::new(DefaultClock))
        .expect("store opens");
    for title in ["Write the parser", "Wire the index", "Ship the export"] {
        store
            .create_task(NewTask::new(title).created_by("planner"))
            .await
            .expect("task created");
    }
    let listed = store.list_tasks().await.expect("listing succeeds");

    let snapshot = build_snapshot(listed.clone(), &DefaultClock).expect("snapshot builds");
    let out = Dir::open_ambient_dir(&root, ambient_authority()).expect("root opens");
    write_snapshot(&out, Utf8Path::new("tasks.json"), &snapshot).expect("snapshot written");

    let text = out.read_to_string("tasks.json").expect("snapshot readable");
    let reread: TaskSnapshot = serde_json::from_str(&text).expect("snapshot parses");
    assert_eq!(reread, snapshot);
    assert_eq!(reread.schema_version, EXPORT_SCHEMA_VERSION);
    assert_eq!(reread.tasks, listed);
    assert!(reread.verify().expect("checksum computes"));
}
