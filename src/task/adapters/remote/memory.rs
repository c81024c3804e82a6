//! In-memory issue tracker.

use super::mapping::apply_draft;
use crate::task::ports::{
    IssueDraft, IssuePage, IssueQuery, IssueTrackerClient, IssueTrackerError, IssueTrackerResult,
    RemoteIssue,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Thread-safe tracker fake with Redmine paging semantics.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIssueTracker {
    state: Arc<RwLock<TrackerState>>,
}

#[derive(Debug, Default)]
struct TrackerState {
    issues: BTreeMap<u64, RemoteIssue>,
    last_id: u64,
    offline: bool,
    list_calls: usize,
}

impl InMemoryIssueTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an issue as-is, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn insert(&self, issue: RemoteIssue) -> IssueTrackerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.last_id = state.last_id.max(issue.id);
        state.issues.insert(issue.id, issue);
        Ok(())
    }

    /// Returns every stored issue ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn issues(&self) -> IssueTrackerResult<Vec<RemoteIssue>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.issues.values().cloned().collect())
    }

    /// Makes every call fail with a transport error while `offline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn set_offline(&self, offline: bool) -> IssueTrackerResult<()> {
        self.state.write().map_err(poisoned)?.offline = offline;
        Ok(())
    }

    /// Number of `list_issues` calls served so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn list_calls(&self) -> IssueTrackerResult<usize> {
        Ok(self.state.read().map_err(poisoned)?.list_calls)
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> IssueTrackerError {
    IssueTrackerError::Transport(format!("tracker state lock poisoned: {err}"))
}

fn ensure_online(state: &TrackerState) -> IssueTrackerResult<()> {
    if state.offline {
        return Err(IssueTrackerError::Transport("tracker offline".to_owned()));
    }
    Ok(())
}

#[async_trait]
impl IssueTrackerClient for InMemoryIssueTracker {
    async fn list_issues(&self, query: &IssueQuery) -> IssueTrackerResult<IssuePage> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.list_calls = state.list_calls.saturating_add(1);
        ensure_online(&state)?;

        let matching: Vec<&RemoteIssue> = state
            .issues
            .values()
            .filter(|issue| {
                query.custom_field.as_ref().is_none_or(|(field, value)| {
                    issue
                        .custom_field(*field)
                        .and_then(|found| found.value.as_str())
                        == Some(value.as_str())
                })
            })
            .collect();

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let issues = matching
            .iter()
            .skip(offset)
            .take(limit)
            .map(|issue| (*issue).clone())
            .collect();

        Ok(IssuePage {
            issues,
            total_count: u64::try_from(matching.len()).unwrap_or(u64::MAX),
            offset: query.offset,
            limit: query.limit,
        })
    }

    async fn create_issue(&self, draft: &IssueDraft) -> IssueTrackerResult<RemoteIssue> {
        let mut state = self.state.write().map_err(poisoned)?;
        ensure_online(&state)?;

        state.last_id = state.last_id.saturating_add(1);
        let blank = RemoteIssue {
            id: state.last_id,
            subject: String::new(),
            description: None,
            status: None,
            priority: None,
            assigned_to: None,
            custom_fields: Vec::new(),
        };
        let issue = apply_draft(blank, draft);
        state.issues.insert(issue.id, issue.clone());
        Ok(issue)
    }

    async fn update_issue(&self, issue_id: u64, draft: &IssueDraft) -> IssueTrackerResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        ensure_online(&state)?;

        let current = state
            .issues
            .remove(&issue_id)
            .ok_or(IssueTrackerError::IssueNotFound(issue_id))?;
        state.issues.insert(issue_id, apply_draft(current, draft));
        Ok(())
    }
}
