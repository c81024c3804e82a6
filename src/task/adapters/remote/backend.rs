//! Task backend over a remote issue tracker.

use super::mapping::{FieldMapping, apply_draft, issue_to_task, task_to_draft};
use crate::task::{
    adapters::local::{allocate_task_id, random_suffix},
    document::TaskDocument,
    domain::{TaskData, TaskId},
    ports::{
        BackendCapabilities, BackendKind, DuplicateTaskId, IdRequest, IssueQuery,
        IssueTrackerClient, IssueTrackerError, RemoteIssue, TaskBackend, TaskBackendError,
        TaskBackendResult, TaskMutation,
    },
};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Number of duplicated ids reported in a [`TaskBackendError::DuplicateIdentifier`].
pub const DUPLICATE_SAMPLE_LIMIT: usize = 5;

const DEFAULT_PAGE_SIZE: u64 = 100;

/// Pacing for bulk writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Tasks written per batch; `None` writes everything in one batch.
    pub batch_size: Option<usize>,
    /// Pause between batches.
    pub pause: Option<Duration>,
}

/// Task backend that stores tasks as issues in a remote tracker.
///
/// The tracker is authoritative. An optional mirror backend receives
/// best-effort copies of everything read or written and answers reads
/// while the tracker is unreachable.
pub struct RemoteTaskBackend<T, C>
where
    T: IssueTrackerClient,
    C: Clock + Send + Sync,
{
    client: Arc<T>,
    mapping: FieldMapping,
    page_size: u64,
    batch: BatchPolicy,
    mirror: Option<Arc<dyn TaskBackend>>,
    issues: RwLock<HashMap<TaskId, RemoteIssue>>,
    clock: Arc<C>,
}

impl<T, C> RemoteTaskBackend<T, C>
where
    T: IssueTrackerClient,
    C: Clock + Send + Sync,
{
    /// Creates a backend over `client`.
    #[must_use]
    pub fn new(client: Arc<T>, mapping: FieldMapping, clock: Arc<C>) -> Self {
        Self {
            client,
            mapping,
            page_size: DEFAULT_PAGE_SIZE,
            batch: BatchPolicy::default(),
            mirror: None,
            issues: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Overrides the listing page size. Zero is treated as one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets bulk write pacing.
    #[must_use]
    pub fn with_batch_policy(mut self, batch: BatchPolicy) -> Self {
        self.batch = batch;
        self
    }

    /// Attaches an offline mirror.
    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn TaskBackend>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Lists every issue page by page until the reported total is reached.
    async fn fetch_all_issues(&self) -> TaskBackendResult<Vec<RemoteIssue>> {
        let mut issues = Vec::new();
        let mut offset = 0_u64;
        loop {
            let page = self
                .client
                .list_issues(&IssueQuery::page(offset, self.page_size))
                .await
                .map_err(unavailable)?;
            let received = page.issues.len();
            debug!(offset, received, total = page.total_count, "fetched issue page");

            issues.extend(page.issues);
            offset = offset.saturating_add(u64::try_from(received).unwrap_or(u64::MAX));
            if received == 0 || offset >= page.total_count {
                return Ok(issues);
            }
        }
    }

    /// Fetches every issue, rebuilds the issue cache and returns the tasks.
    async fn refresh(&self) -> TaskBackendResult<Vec<TaskData>> {
        let issues = self.fetch_all_issues().await?;
        ensure_unique_ids(&issues, &self.mapping)?;

        let mut tasks = Vec::with_capacity(issues.len());
        let mut cache = HashMap::with_capacity(issues.len());
        for issue in issues {
            let Some(task) = self.map_issue(&issue)? else {
                continue;
            };
            cache.insert(task.id.clone(), issue);
            tasks.push(task);
        }
        tasks.sort_by(|left, right| left.id.cmp(&right.id));

        *self.issues.write().map_err(poisoned)? = cache;
        Ok(tasks)
    }

    /// Maps an issue, skipping (with a warning) issues whose task id does
    /// not parse.
    fn map_issue(&self, issue: &RemoteIssue) -> TaskBackendResult<Option<TaskData>> {
        match issue_to_task(issue, &self.mapping) {
            Err(TaskBackendError::InvalidTask(err)) => {
                warn!(issue_id = issue.id, error = %err, "skipping issue with invalid task id");
                Ok(None)
            }
            other => other,
        }
    }

    fn cached_issue(&self, id: &TaskId) -> TaskBackendResult<Option<RemoteIssue>> {
        Ok(self.issues.read().map_err(poisoned)?.get(id).cloned())
    }

    fn cache_issue(&self, id: TaskId, issue: RemoteIssue) -> TaskBackendResult<()> {
        self.issues.write().map_err(poisoned)?.insert(id, issue);
        Ok(())
    }

    /// Finds the issue for a task: issue cache, then a filtered query, then
    /// a full refresh.
    async fn locate_issue(&self, id: &TaskId) -> TaskBackendResult<Option<RemoteIssue>> {
        if let Some(issue) = self.cached_issue(id)? {
            return Ok(Some(issue));
        }

        let query = IssueQuery::page(0, self.page_size)
            .with_custom_field(self.mapping.task_id_field, id.as_str());
        let page = self.client.list_issues(&query).await.map_err(unavailable)?;
        let mut matches: Vec<RemoteIssue> = page
            .issues
            .into_iter()
            .filter(|issue| self.mapping.raw_task_id(issue) == Some(id.as_str()))
            .collect();
        if matches.len() > 1 {
            ensure_unique_ids(&matches, &self.mapping)?;
        }
        if let Some(issue) = matches.pop() {
            self.cache_issue(id.clone(), issue.clone())?;
            return Ok(Some(issue));
        }

        debug!(task_id = %id, "filtered lookup missed; refreshing full listing");
        self.refresh().await?;
        self.cached_issue(id)
    }

    async fn get_remote(&self, id: &TaskId) -> TaskBackendResult<Option<TaskData>> {
        match self.locate_issue(id).await? {
            Some(issue) => self.map_issue(&issue),
            None => Ok(None),
        }
    }

    async fn mirror_tasks(&self, tasks: &[TaskData]) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        let outcome = if mirror.capabilities().supports_bulk_write() {
            mirror.write_tasks(tasks).await
        } else {
            write_each(mirror.as_ref(), tasks).await
        };
        if let Err(err) = outcome {
            warn!(error = %err, "failed to refresh task mirror");
        }
    }
}

async fn write_each(backend: &dyn TaskBackend, tasks: &[TaskData]) -> TaskBackendResult<()> {
    for task in tasks {
        backend.write_task(task).await?;
    }
    Ok(())
}

fn unavailable(err: IssueTrackerError) -> TaskBackendError {
    TaskBackendError::BackendUnavailable(err.to_string())
}

fn poisoned<G>(err: PoisonError<G>) -> TaskBackendError {
    TaskBackendError::io(std::io::Error::other(err.to_string()))
}

/// Fails when two issues carry the same task id value.
fn ensure_unique_ids(issues: &[RemoteIssue], mapping: &FieldMapping) -> TaskBackendResult<()> {
    let mut by_value: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for issue in issues {
        if let Some(raw) = mapping.raw_task_id(issue) {
            by_value.entry(raw).or_default().push(issue.id);
        }
    }

    let duplicates: Vec<DuplicateTaskId> = by_value
        .into_iter()
        .filter(|(_, issue_ids)| issue_ids.len() > 1)
        .map(|(task_id, issue_ids)| DuplicateTaskId {
            task_id: task_id.to_owned(),
            issue_ids,
        })
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }

    let total = duplicates.len();
    Err(TaskBackendError::DuplicateIdentifier {
        sample: duplicates.into_iter().take(DUPLICATE_SAMPLE_LIMIT).collect(),
        total,
    })
}

#[async_trait]
impl<T, C> TaskBackend for RemoteTaskBackend<T, C>
where
    T: IssueTrackerClient,
    C: Clock + Send + Sync,
{
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::new()
            .with_bulk_write()
            .with_id_generation()
    }

    async fn list_tasks(&self) -> TaskBackendResult<Vec<TaskData>> {
        match self.refresh().await {
            Ok(tasks) => {
                self.mirror_tasks(&tasks).await;
                Ok(tasks)
            }
            Err(TaskBackendError::BackendUnavailable(reason)) if self.mirror.is_some() => {
                warn!(reason = %reason, "issue tracker unavailable; listing from mirror");
                match &self.mirror {
                    Some(mirror) => mirror.list_tasks().await,
                    None => Err(TaskBackendError::BackendUnavailable(reason)),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn get_task(&self, id: &TaskId) -> TaskBackendResult<Option<TaskData>> {
        match (self.get_remote(id).await, &self.mirror) {
            (Err(TaskBackendError::BackendUnavailable(reason)), Some(mirror)) => {
                warn!(task_id = %id, reason = %reason, "issue tracker unavailable; reading mirror");
                mirror.get_task(id).await
            }
            (result, _) => result,
        }
    }

    async fn write_task(&self, task: &TaskData) -> TaskBackendResult<()> {
        let normalized = task.clone().normalized();
        let draft = task_to_draft(&normalized, &self.mapping)
            .map_err(|err| TaskBackendError::document(normalized.id.as_str(), err))?;

        let stored = match self.locate_issue(&normalized.id).await? {
            Some(existing) => {
                let issue_id = existing.id;
                match self.client.update_issue(issue_id, &draft).await {
                    Ok(()) => apply_draft(existing, &draft),
                    Err(IssueTrackerError::IssueNotFound(_)) => {
                        debug!(
                            task_id = %normalized.id,
                            issue_id,
                            "cached issue vanished; recreating"
                        );
                        self.client.create_issue(&draft).await.map_err(unavailable)?
                    }
                    Err(err) => return Err(unavailable(err)),
                }
            }
            None => self.client.create_issue(&draft).await.map_err(unavailable)?,
        };
        self.cache_issue(normalized.id.clone(), stored)?;
        self.mirror_tasks(std::slice::from_ref(&normalized)).await;
        Ok(())
    }

    async fn write_tasks(&self, tasks: &[TaskData]) -> TaskBackendResult<()> {
        let size = self
            .batch
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or_else(|| tasks.len().max(1));
        for (batch_index, batch) in tasks.chunks(size).enumerate() {
            if batch_index > 0 {
                if let Some(pause) = self.batch.pause {
                    tokio::time::sleep(pause).await;
                }
            }
            debug!(batch = batch_index, tasks = batch.len(), "writing task batch");
            for task in batch {
                self.write_task(task).await?;
            }
        }
        Ok(())
    }

    async fn generate_task_id(&self, request: IdRequest) -> TaskBackendResult<TaskId> {
        let taken: BTreeSet<TaskId> = self
            .list_tasks()
            .await?
            .into_iter()
            .map(|task| task.id)
            .collect();
        allocate_task_id(self.clock.utc(), request, random_suffix, |candidate| {
            taken.contains(candidate)
        })
    }

    async fn update_task(
        &self,
        id: &TaskId,
        mutation: TaskMutation<'_>,
    ) -> TaskBackendResult<TaskData> {
        let current = self
            .get_remote(id)
            .await?
            .ok_or_else(|| TaskBackendError::NotFound(id.clone()))?;
        let next = mutation(TaskDocument::new(current.clone(), String::new()))?;
        if next.task.id != *id {
            return Err(TaskBackendError::IdChanged {
                expected: id.clone(),
                actual: next.task.id,
            });
        }

        let mut task = next.task.normalized();
        if task == current {
            return Ok(current);
        }
        task.stamp_update(current.doc_version, self.clock.utc());
        self.write_task(&task).await?;
        Ok(task)
    }
}
