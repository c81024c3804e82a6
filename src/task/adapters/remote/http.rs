//! Redmine REST client.

use crate::task::ports::{
    IssueDraft, IssuePage, IssueQuery, IssueTrackerClient, IssueTrackerError, IssueTrackerResult,
    RemoteIssue,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Header carrying the Redmine API key.
pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";

const ERROR_BODY_LIMIT: usize = 512;

/// Connection settings for [`RedmineClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedmineClientConfig {
    /// Tracker root URL, e.g. `https://redmine.example.com`.
    pub base_url: String,
    /// Project identifier issues are listed from and created in.
    pub project_id: String,
    /// API key, when the tracker requires authentication.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// HTTP client for the Redmine issues API.
#[derive(Debug, Clone)]
pub struct RedmineClient {
    http: reqwest::Client,
    config: RedmineClientConfig,
}

#[derive(Serialize)]
struct IssueEnvelope<'a> {
    issue: IssuePayload<'a>,
}

#[derive(Serialize)]
struct IssuePayload<'a> {
    project_id: &'a str,
    #[serde(flatten)]
    draft: &'a IssueDraft,
}

#[derive(Deserialize)]
struct CreatedIssue {
    issue: RemoteIssue,
}

impl RedmineClient {
    /// Builds a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`IssueTrackerError::Transport`] when the HTTP client cannot
    /// be constructed.
    pub fn new(config: RedmineClientConfig) -> IssueTrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.config.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    fn envelope<'a>(&'a self, draft: &'a IssueDraft) -> IssueEnvelope<'a> {
        IssueEnvelope {
            issue: IssuePayload {
                project_id: &self.config.project_id,
                draft,
            },
        }
    }
}

fn transport(err: reqwest::Error) -> IssueTrackerError {
    IssueTrackerError::Transport(err.to_string())
}

fn decode(err: reqwest::Error) -> IssueTrackerError {
    IssueTrackerError::Decode(err.to_string())
}

async fn ensure_success(response: Response) -> IssueTrackerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect();
    Err(IssueTrackerError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IssueTrackerClient for RedmineClient {
    async fn list_issues(&self, query: &IssueQuery) -> IssueTrackerResult<IssuePage> {
        let mut params = vec![
            ("project_id".to_owned(), self.config.project_id.clone()),
            ("status_id".to_owned(), "*".to_owned()),
            ("offset".to_owned(), query.offset.to_string()),
            ("limit".to_owned(), query.limit.to_string()),
        ];
        if let Some((field, value)) = &query.custom_field {
            params.push((format!("cf_{field}"), value.clone()));
        }

        debug!(offset = query.offset, limit = query.limit, "requesting issue page");
        let response = self
            .request(Method::GET, "issues.json")
            .query(&params)
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await?.json().await.map_err(decode)
    }

    async fn create_issue(&self, draft: &IssueDraft) -> IssueTrackerResult<RemoteIssue> {
        let response = self
            .request(Method::POST, "issues.json")
            .json(&self.envelope(draft))
            .send()
            .await
            .map_err(transport)?;
        let created: CreatedIssue = ensure_success(response).await?.json().await.map_err(decode)?;
        Ok(created.issue)
    }

    async fn update_issue(&self, issue_id: u64, draft: &IssueDraft) -> IssueTrackerResult<()> {
        let response = self
            .request(Method::PUT, &format!("issues/{issue_id}.json"))
            .json(&self.envelope(draft))
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(IssueTrackerError::IssueNotFound(issue_id));
        }
        ensure_success(response).await?;
        Ok(())
    }
}
