//! Local document store with optimistic concurrency control.

use super::fs::{modified_millis, read_optional, run_blocking, write_atomic_stamped};
use super::ids::{allocate_task_id, random_suffix};
use super::index::{TaskIndexCache, TaskIndexEntry, TaskIndexFile};
use crate::task::{
    document::{
        DocumentError, TaskDocument, normalize_body,
        sections::{default_body, set_section},
    },
    domain::{IdSource, TaskData, TaskDomainError, TaskId},
    ports::{
        BackendCapabilities, BackendKind, IdRequest, TaskBackend, TaskBackendError,
        TaskBackendResult, TaskMutation,
    },
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::future::{Future, ready};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// File name of the document inside each task directory.
pub const DOCUMENT_FILE_NAME: &str = "README.md";

const SUMMARY_SECTION: &str = "Summary";

/// Retry budget for optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccPolicy {
    /// Read-mutate-write attempts before giving up. Always at least one.
    pub max_attempts: u32,
}

impl OccPolicy {
    /// Creates a policy, clamping `max_attempts` to at least one.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }
}

impl Default for OccPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Result of [`LocalTaskStore::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Whether a new document was written.
    pub changed: bool,
    /// The document as persisted (or as found, when unchanged).
    pub document: TaskDocument,
}

/// Parameters for [`LocalTaskStore::create_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    title: String,
    description: String,
    owner: String,
    priority: Option<String>,
    tags: Vec<String>,
    depends_on: Vec<TaskId>,
    verify: Vec<String>,
    id: Option<TaskId>,
    created_by: Option<String>,
}

impl NewTask {
    /// Starts a new task with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            owner: String::new(),
            priority: None,
            tags: Vec::new(),
            depends_on: Vec::new(),
            verify: Vec::new(),
            id: None,
            created_by: None,
        }
    }

    /// Sets the description, also used as the initial Summary section.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Overrides the default priority.
    #[must_use]
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Sets tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Sets dependencies.
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on = depends_on.into_iter().collect();
        self
    }

    /// Sets verification commands.
    #[must_use]
    pub fn with_verify(mut self, verify: impl IntoIterator<Item = String>) -> Self {
        self.verify = verify.into_iter().collect();
        self
    }

    /// Uses a caller-supplied id instead of generating one.
    #[must_use]
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    /// Records the creator.
    #[must_use]
    pub fn created_by(mut self, author: impl Into<String>) -> Self {
        self.created_by = Some(author.into());
        self
    }

    fn into_task(
        self,
        id: TaskId,
        source: IdSource,
        now: DateTime<Utc>,
    ) -> Result<TaskData, TaskDomainError> {
        let mut task = TaskData::new(id, self.title)?;
        task.description = self.description;
        task.owner = self.owner;
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        task.tags = self.tags;
        task.depends_on = self.depends_on;
        task.verify = self.verify;
        task.created_at = Some(now);
        task.doc_updated_at = Some(now);
        task.doc_updated_by.clone_from(&self.created_by);
        task.created_by = self.created_by;
        task.id_source = Some(source);
        Ok(task.normalized())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    text: String,
    mtime_millis: i64,
}

/// Filesystem-backed task store.
///
/// Documents live at `<tasks root>/<id>/README.md`. Mutations of existing
/// documents go through [`LocalTaskStore::update`], which re-applies the
/// mutation to fresh content when another writer got in first.
pub struct LocalTaskStore<C>
where
    C: Clock + Send + Sync,
{
    tasks: Arc<Dir>,
    index: Option<TaskIndexCache>,
    occ: OccPolicy,
    ids: IdRequest,
    clock: Arc<C>,
}

impl<C> Clone for LocalTaskStore<C>
where
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
            index: self.index.clone(),
            occ: self.occ,
            ids: self.ids,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> LocalTaskStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a store over an open tasks directory.
    #[must_use]
    pub fn new(tasks: Dir, clock: Arc<C>) -> Self {
        Self {
            tasks: Arc::new(tasks),
            index: None,
            occ: OccPolicy::default(),
            ids: IdRequest::default(),
            clock,
        }
    }

    /// Opens (creating if needed) the tasks root at `tasks_root`.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from creating or opening the directory.
    pub fn open(tasks_root: &Utf8Path, clock: Arc<C>) -> io::Result<Self> {
        Dir::create_ambient_dir_all(tasks_root, ambient_authority())?;
        let tasks = Dir::open_ambient_dir(tasks_root, ambient_authority())?;
        Ok(Self::new(tasks, clock))
    }

    /// Attaches an index cache used to speed up listings.
    #[must_use]
    pub fn with_index(mut self, index: TaskIndexCache) -> Self {
        self.index = Some(index);
        self
    }

    /// Overrides the OCC retry budget.
    #[must_use]
    pub const fn with_occ_policy(mut self, occ: OccPolicy) -> Self {
        self.occ = occ;
        self
    }

    /// Overrides id allocation parameters used by
    /// [`LocalTaskStore::create_task`].
    #[must_use]
    pub const fn with_id_request(mut self, ids: IdRequest) -> Self {
        self.ids = ids;
        self
    }

    /// Returns the OCC retry budget.
    #[must_use]
    pub const fn occ_policy(&self) -> OccPolicy {
        self.occ
    }

    /// Reads a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBackendError::NotFound`] when no document exists for
    /// `id`, and [`TaskBackendError::Document`] when it cannot be parsed.
    pub async fn get(&self, id: &TaskId) -> TaskBackendResult<TaskData> {
        self.get_document(id).await.map(|document| document.task)
    }

    /// Reads a task together with its body.
    ///
    /// # Errors
    ///
    /// See [`LocalTaskStore::get`].
    pub async fn get_document(&self, id: &TaskId) -> TaskBackendResult<TaskDocument> {
        let snapshot = self
            .read_snapshot(&document_path(id))
            .await?
            .ok_or_else(|| TaskBackendError::NotFound(id.clone()))?;
        parse_snapshot(id, &document_path(id), &snapshot.text)
    }

    /// Applies `mutate` to the current document under optimistic
    /// concurrency control.
    ///
    /// Each attempt reads the document and its mtime, awaits the mutator,
    /// then writes only if the document is still exactly what was read. On
    /// a mismatch the mutator runs again against the fresh content, so
    /// concurrent edits to other parts of the document survive.
    ///
    /// The store stamps `doc_version` and `doc_updated_at` on every write.
    /// A mutator that returns the document unchanged causes no write.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBackendError::NotFound`] for an unknown id,
    /// [`TaskBackendError::IdChanged`] when the mutator alters the id,
    /// [`TaskBackendError::ConflictExceeded`] when every attempt observed a
    /// concurrent write, and any error produced by `mutate`.
    pub async fn update<F, Fut, E>(&self, id: &TaskId, mut mutate: F) -> Result<UpdateOutcome, E>
    where
        F: FnMut(TaskDocument) -> Fut,
        Fut: Future<Output = Result<TaskDocument, E>>,
        E: From<TaskBackendError>,
    {
        let path = document_path(id);
        let max_attempts = self.occ.max_attempts;

        for attempt in 1..=max_attempts {
            let snapshot = self
                .read_snapshot(&path)
                .await?
                .ok_or_else(|| TaskBackendError::NotFound(id.clone()))?;
            let current = parse_snapshot(id, &path, &snapshot.text)?;
            let candidate = mutate(current.clone()).await?;

            let Some(next) = self.prepare_candidate(&current, candidate)? else {
                return Ok(UpdateOutcome {
                    changed: false,
                    document: current,
                });
            };
            let rendered = next
                .render()
                .map_err(|err| TaskBackendError::document(path.as_str(), err))?;

            if self
                .commit_if_unchanged(&path, snapshot, rendered, next.task.clone())
                .await?
            {
                return Ok(UpdateOutcome {
                    changed: true,
                    document: next,
                });
            }
            if attempt < max_attempts {
                warn!(
                    task_id = %id,
                    attempt,
                    max_attempts,
                    "task document changed during update; retrying"
                );
            }
        }

        warn!(task_id = %id, attempts = max_attempts, "task document kept changing; giving up");
        Err(TaskBackendError::ConflictExceeded {
            path: path.into_string(),
            attempts: max_attempts,
        }
        .into())
    }

    /// Creates a task with a scaffolded body.
    ///
    /// The id is either the one supplied on `new_task` (recorded as
    /// `explicit`) or allocated from the clock and random suffixes
    /// (recorded as `generated`). The task directory is claimed atomically,
    /// so two creators can never end up sharing an id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskBackendError::AlreadyExists`] for a taken explicit id,
    /// [`TaskBackendError::IdAllocation`] when no free id was found, and
    /// [`TaskBackendError::InvalidTask`] for a blank title.
    pub async fn create_task(&self, new_task: NewTask) -> TaskBackendResult<TaskData> {
        if new_task.title.trim().is_empty() {
            return Err(TaskDomainError::EmptyTitle.into());
        }
        let dir = Arc::clone(&self.tasks);
        let index = self.index.clone();
        let request = self.ids;
        let now = self.clock.utc();

        run_blocking(move || {
            let explicit = new_task.id.clone();
            let (id, source) = claim_task_dir(&dir, now, request, explicit)?;
            let claimed = id.clone();
            let written = write_new_task(&dir, index.as_ref(), new_task, id, source, now);
            release_on_error(&dir, &claimed, written)
        })
        .await
    }

    fn prepare_candidate(
        &self,
        current: &TaskDocument,
        candidate: TaskDocument,
    ) -> TaskBackendResult<Option<TaskDocument>> {
        if candidate.task.id != current.task.id {
            return Err(TaskBackendError::IdChanged {
                expected: current.task.id.clone(),
                actual: candidate.task.id,
            });
        }

        let mut next = TaskDocument::new(
            candidate.task.normalized(),
            normalize_body(&candidate.body),
        );
        if next == *current {
            return Ok(None);
        }
        next.task
            .stamp_update(current.task.doc_version, self.clock.utc());
        Ok(Some(next))
    }

    async fn read_snapshot(&self, path: &Utf8Path) -> TaskBackendResult<Option<Snapshot>> {
        let dir = Arc::clone(&self.tasks);
        let owned = path.to_owned();
        run_blocking(move || snapshot_of(&dir, &owned).map_err(TaskBackendError::io)).await
    }

    async fn commit_if_unchanged(
        &self,
        path: &Utf8Path,
        expected: Snapshot,
        rendered: String,
        task: TaskData,
    ) -> TaskBackendResult<bool> {
        let dir = Arc::clone(&self.tasks);
        let index = self.index.clone();
        let owned = path.to_owned();
        run_blocking(move || {
            let observed = snapshot_of(&dir, &owned).map_err(TaskBackendError::io)?;
            if observed.as_ref() != Some(&expected) {
                return Ok(false);
            }
            let mtime_millis = write_atomic_stamped(&dir, &owned, rendered.as_bytes())
                .map_err(TaskBackendError::io)?;
            record_in_index(index.as_ref(), &owned, mtime_millis, task);
            Ok(true)
        })
        .await
    }
}

#[async_trait]
impl<C> TaskBackend for LocalTaskStore<C>
where
    C: Clock + Send + Sync,
{
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::new()
            .with_bulk_write()
            .with_id_generation()
            .with_occ()
    }

    async fn list_tasks(&self) -> TaskBackendResult<Vec<TaskData>> {
        let dir = Arc::clone(&self.tasks);
        let index = self.index.clone();
        run_blocking(move || scan_tasks(&dir, index.as_ref())).await
    }

    async fn get_task(&self, id: &TaskId) -> TaskBackendResult<Option<TaskData>> {
        match self.get(id).await {
            Ok(task) => Ok(Some(task)),
            Err(TaskBackendError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn write_task(&self, task: &TaskData) -> TaskBackendResult<()> {
        let dir = Arc::clone(&self.tasks);
        let index = self.index.clone();
        let incoming = task.clone().normalized();
        let now = self.clock.utc();
        run_blocking(move || overwrite_task(&dir, index.as_ref(), incoming, now)).await
    }

    async fn write_tasks(&self, tasks: &[TaskData]) -> TaskBackendResult<()> {
        for task in tasks {
            self.write_task(task).await?;
        }
        Ok(())
    }

    async fn generate_task_id(&self, request: IdRequest) -> TaskBackendResult<TaskId> {
        let dir = Arc::clone(&self.tasks);
        let now = self.clock.utc();
        run_blocking(move || {
            allocate_task_id(now, request, random_suffix, |candidate| {
                dir.exists(candidate.as_str())
            })
        })
        .await
    }

    async fn update_task(
        &self,
        id: &TaskId,
        mutation: TaskMutation<'_>,
    ) -> TaskBackendResult<TaskData> {
        let outcome = self
            .update(id, |document| {
                ready(mutation(document).map_err(TaskBackendError::from))
            })
            .await?;
        Ok(outcome.document.task)
    }
}

fn document_path(id: &TaskId) -> Utf8PathBuf {
    Utf8Path::new(id.as_str()).join(DOCUMENT_FILE_NAME)
}

fn snapshot_of(dir: &Dir, path: &Utf8Path) -> io::Result<Option<Snapshot>> {
    let Some(text) = read_optional(dir, path)? else {
        return Ok(None);
    };
    let mtime_millis = modified_millis(dir, path)?;
    Ok(Some(Snapshot { text, mtime_millis }))
}

fn parse_snapshot(id: &TaskId, path: &Utf8Path, text: &str) -> TaskBackendResult<TaskDocument> {
    let document =
        TaskDocument::parse(text).map_err(|err| TaskBackendError::document(path.as_str(), err))?;
    if document.task.id != *id {
        return Err(TaskBackendError::document(
            path.as_str(),
            DocumentError::malformed(format!(
                "header id {} does not match task directory {id}",
                document.task.id
            )),
        ));
    }
    Ok(document)
}

fn claim_task_dir(
    dir: &Dir,
    now: DateTime<Utc>,
    request: IdRequest,
    explicit: Option<TaskId>,
) -> TaskBackendResult<(TaskId, IdSource)> {
    if let Some(id) = explicit {
        return match dir.create_dir(id.as_str()) {
            Ok(()) => Ok((id, IdSource::Explicit)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(TaskBackendError::AlreadyExists(id))
            }
            Err(err) => Err(TaskBackendError::io(err)),
        };
    }

    let mut failure = None;
    let allocated = allocate_task_id(now, request, random_suffix, |candidate| {
        if failure.is_some() {
            return true;
        }
        match dir.create_dir(candidate.as_str()) {
            Ok(()) => false,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => true,
            Err(err) => {
                failure = Some(err);
                true
            }
        }
    });
    if let Some(err) = failure {
        return Err(TaskBackendError::io(err));
    }
    Ok((allocated?, IdSource::Generated))
}

fn overwrite_task(
    dir: &Dir,
    index: Option<&TaskIndexCache>,
    incoming: TaskData,
    now: DateTime<Utc>,
) -> TaskBackendResult<()> {
    let path = document_path(&incoming.id);
    let Some(text) = read_optional(dir, &path).map_err(TaskBackendError::io)? else {
        let body = default_body(&incoming.title)
            .map_err(|err| TaskBackendError::document(path.as_str(), err))?;
        return write_document(dir, index, &TaskDocument::new(incoming, body));
    };

    let current = parse_snapshot(&incoming.id, &path, &text)?;
    let mut next = TaskDocument::new(incoming, current.body.clone());
    if next == current {
        return Ok(());
    }
    next.task.stamp_update(current.task.doc_version, now);
    write_document(dir, index, &next)
}

fn write_new_task(
    dir: &Dir,
    index: Option<&TaskIndexCache>,
    new_task: NewTask,
    id: TaskId,
    source: IdSource,
    now: DateTime<Utc>,
) -> TaskBackendResult<TaskData> {
    let task = new_task.into_task(id, source, now)?;
    let path = document_path(&task.id);

    let scaffold =
        default_body(&task.title).map_err(|err| TaskBackendError::document(path.as_str(), err))?;
    let body = if task.description.trim().is_empty() {
        scaffold
    } else {
        set_section(&scaffold, SUMMARY_SECTION, &task.description)
    };

    let document = TaskDocument::new(task, body);
    write_document(dir, index, &document)?;
    debug!(task_id = %document.task.id, "created task document");
    Ok(document.task)
}

/// Removes a claimed task directory when creation failed after the claim,
/// so the id is free again and no empty directory is left behind.
pub(super) fn release_on_error<T>(
    dir: &Dir,
    id: &TaskId,
    result: TaskBackendResult<T>,
) -> TaskBackendResult<T> {
    if result.is_err() {
        if let Err(err) = dir.remove_dir_all(id.as_str()) {
            debug!(task_id = %id, error = %err, "failed to release claimed task directory");
        }
    }
    result
}

fn write_document(
    dir: &Dir,
    index: Option<&TaskIndexCache>,
    document: &TaskDocument,
) -> TaskBackendResult<()> {
    let path = document_path(&document.task.id);
    let rendered = document
        .render()
        .map_err(|err| TaskBackendError::document(path.as_str(), err))?;
    dir.create_dir_all(document.task.id.as_str())
        .map_err(TaskBackendError::io)?;
    let mtime_millis =
        write_atomic_stamped(dir, &path, rendered.as_bytes()).map_err(TaskBackendError::io)?;
    record_in_index(index, &path, mtime_millis, document.task.clone());
    Ok(())
}

/// Refreshes one index entry after a write, stamped with the mtime of the
/// bytes this writer produced. Failures only cost a re-parse on the next
/// listing.
fn record_in_index(
    index: Option<&TaskIndexCache>,
    path: &Utf8Path,
    mtime_millis: i64,
    task: TaskData,
) {
    let Some(cache) = index else {
        return;
    };
    let mut file = cache.load().unwrap_or_default();
    file.insert(TaskIndexEntry {
        task,
        document_path: path.to_string(),
        mtime_millis,
    });
    if let Err(err) = cache.save(&file) {
        debug!(error = %err, "failed to save task index");
    }
}

fn scan_tasks(dir: &Dir, index: Option<&TaskIndexCache>) -> TaskBackendResult<Vec<TaskData>> {
    let cached = index.and_then(TaskIndexCache::load).unwrap_or_default();
    let mut fresh = TaskIndexFile::new();
    let mut reparsed = 0_usize;

    for item in dir.entries().map_err(TaskBackendError::io)? {
        let entry = item.map_err(TaskBackendError::io)?;
        if !entry.file_type().map_err(TaskBackendError::io)?.is_dir() {
            continue;
        }
        let name = entry.file_name().map_err(TaskBackendError::io)?;
        let Ok(id) = TaskId::parse(&name) else {
            debug!(entry = %name, "skipping directory that is not a task id");
            continue;
        };

        let path = document_path(&id);
        let mtime_millis = match modified_millis(dir, &path) {
            Ok(mtime) => mtime,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(task_id = %id, "task directory has no document; skipping");
                continue;
            }
            Err(err) => return Err(TaskBackendError::io(err)),
        };

        let task = match cached.get(&id) {
            Some(hit) if hit.mtime_millis == mtime_millis && hit.document_path == path.as_str() => {
                hit.task.clone()
            }
            _ => {
                let Some(text) = read_optional(dir, &path).map_err(TaskBackendError::io)? else {
                    continue;
                };
                reparsed = reparsed.saturating_add(1);
                parse_snapshot(&id, &path, &text)?.task
            }
        };
        fresh.insert(TaskIndexEntry {
            task,
            document_path: path.into_string(),
            mtime_millis,
        });
    }

    debug!(tasks = fresh.by_id.len(), reparsed, "scanned task documents");
    if let Some(cache) = index {
        if let Err(err) = cache.save(&fresh) {
            debug!(error = %err, "failed to save task index");
        }
    }
    Ok(fresh.into_tasks())
}
