//! Integration tests for concurrent use of the local task store.
//!
//! Several store handles over the same directory stand in for separate
//! agent processes sharing one repository checkout.

#![expect(
    clippy::expect_used,
    reason = "Test code uses expect for assertion clarity"
)]

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::collections::BTreeSet;
use std::sync::Arc;
use taskplane::task::{
    adapters::local::{DOCUMENT_FILE_NAME, LocalTaskStore, NewTask, OccPolicy, TaskIndexCache},
    document::TaskDocument,
    domain::TaskId,
    ports::{IdRequest, TaskBackend, TaskBackendError},
};
use tempfile::TempDir;

type Store = LocalTaskStore<DefaultClock>;

struct Checkout {
    _guard: TempDir,
    root: Utf8PathBuf,
}

impl Checkout {
    fn tasks_root(&self) -> Utf8PathBuf {
        self.root.join("tasks")
    }

    fn open_store(&self) -> Store {
        LocalTaskStore::open(&self.tasks_root(), Arc::new(DefaultClock)).expect("store opens")
    }

    fn document_path(&self, id: &TaskId) -> Utf8PathBuf {
        self.tasks_root().join(id.as_str()).join(DOCUMENT_FILE_NAME)
    }
}

#[fixture]
fn checkout() -> Checkout {
    let guard = tempfile::tempdir().expect("temp dir created");
    let root = Utf8PathBuf::from_path_buf(guard.path().to_path_buf()).expect("UTF-8 temp path");
    Checkout {
        _guard: guard,
        root,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn parallel_creators_never_share_an_id(checkout: Checkout) {
    let request = IdRequest {
        suffix_length: 2,
        attempts: 1000,
    };
    let mut handles = Vec::new();
    for worker in 0..24 {
        let store = checkout.open_store().with_id_request(request);
        handles.push(tokio::spawn(async move {
            store
                .create_task(NewTask::new(format!("Task from worker {worker}")).created_by("agent"))
                .await
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        let created = handle
            .await
            .expect("worker joins")
            .expect("task created");
        assert!(ids.insert(created.id), "id allocated twice");
    }

    let listed = checkout
        .open_store()
        .list_tasks()
        .await
        .expect("listing succeeds");
    assert_eq!(listed.len(), 24);
    assert_eq!(
        listed.into_iter().map(|task| task.id).collect::<BTreeSet<_>>(),
        ids
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn explicit_id_race_has_one_winner(checkout: Checkout) {
    let id = TaskId::parse("202601151230-RACE01").expect("valid id");
    let mut handles = Vec::new();
    for worker in 0..8 {
        let store = checkout.open_store();
        let wanted = id.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_task(NewTask::new(format!("Claim {worker}")).with_id(wanted))
                .await
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.expect("worker joins") {
            Ok(_) => winners += 1,
            Err(TaskBackendError::AlreadyExists(_)) => losers += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((winners, losers), (1, 7));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn edit_from_another_handle_survives_update(checkout: Checkout) {
    let writer = checkout.open_store();
    let other = checkout.open_store();
    let created = writer
        .create_task(NewTask::new("Shared").with_description("Original summary."))
        .await
        .expect("task created");
    let id = created.id.clone();
    let mut calls = 0_u32;

    let outcome = writer
        .update(&id, |mut document: TaskDocument| {
            calls += 1;
            let second = other.clone();
            let task_id = id.clone();
            async move {
                if calls == 1 {
                    second
                        .update(&task_id, |mut concurrent: TaskDocument| async move {
                            concurrent
                                .body
                                .push_str("\n## Review\n\nApproved by a second agent.\n");
                            Ok::<_, TaskBackendError>(concurrent)
                        })
                        .await?;
                }
                document.task.owner = "alice".to_owned();
                Ok::<_, TaskBackendError>(document)
            }
        })
        .await
        .expect("update succeeds after retry");

    assert_eq!(calls, 2);
    assert!(outcome.changed);
    let stored = writer.get_document(&id).await.expect("reads back");
    assert_eq!(stored.task.owner, "alice");
    assert_eq!(stored.task.doc_version, 3);
    assert!(stored.body.contains("Approved by a second agent."));
    assert!(stored.body.contains("Original summary."));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn persistent_contention_leaves_last_external_write(checkout: Checkout) {
    let store = checkout.open_store().with_occ_policy(OccPolicy::new(2));
    let created = store
        .create_task(NewTask::new("Contended"))
        .await
        .expect("task created");
    let path = checkout.document_path(&created.id);
    let mut calls = 0_u32;

    let result = store
        .update(&created.id, |mut document: TaskDocument| {
            calls += 1;
            let mut text = std::fs::read_to_string(&path).expect("document readable");
            text.push_str(&format!("\nOutside edit {calls}\n"));
            std::fs::write(&path, &text).expect("outside write succeeds");
            document.task.title = "Never stored".to_owned();
            std::future::ready(Ok::<_, TaskBackendError>(document))
        })
        .await;

    let Err(TaskBackendError::ConflictExceeded { attempts, path: reported }) = result else {
        panic!("expected conflict error");
    };
    assert_eq!(attempts, 2);
    assert!(reported.ends_with(DOCUMENT_FILE_NAME));
    let on_disk = std::fs::read_to_string(&path).expect("document readable");
    assert!(on_disk.ends_with("Outside edit 2\n"));
    assert!(!on_disk.contains("Never stored"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn index_written_by_one_handle_serves_another(checkout: Checkout) {
    let cache_root = checkout.root.join("cache");
    let first = checkout
        .open_store()
        .with_index(TaskIndexCache::open(&cache_root).expect("cache opens"));
    let created = first
        .create_task(NewTask::new("Indexed"))
        .await
        .expect("task created");

    let second = checkout
        .open_store()
        .with_index(TaskIndexCache::open(&cache_root).expect("cache opens"));
    let listed = second.list_tasks().await.expect("listing succeeds");

    assert_eq!(listed, vec![created]);
    assert!(cache_root.join(TaskIndexCache::file_name()).exists());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deleted_index_is_rebuilt(checkout: Checkout) {
    let cache_root = checkout.root.join("cache");
    let store = checkout
        .open_store()
        .with_index(TaskIndexCache::open(&cache_root).expect("cache opens"));
    store
        .create_task(NewTask::new("Indexed"))
        .await
        .expect("task created");
    std::fs::remove_file(cache_root.join(TaskIndexCache::file_name())).expect("index removed");

    let listed = store.list_tasks().await.expect("listing succeeds");

    assert_eq!(listed.len(), 1);
    assert!(cache_root.join(TaskIndexCache::file_name()).exists());
}
