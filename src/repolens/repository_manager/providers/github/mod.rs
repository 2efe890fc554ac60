//! GitHub implementation of [`RemoteSource`]
//!
//! REST calls go through `reqwest` so the rate-limit headers of every response
//! can be inspected; content is fetched with a shallow gitoxide clone.
//!
//! ## Authentication
//!
//! The token is optional. Without it GitHub allows 60 requests/hour per IP,
//! with it 5,000 requests/hour. A missing token only lowers that ceiling.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::models::{
    ActivityItem, ContributorRecord, RepositoryActivity, RepositoryMetadata,
};
use super::{RemoteSource, git_clone};
use crate::repolens::config::DEFAULT_CLONE_TIMEOUT;
use crate::repolens::errors::{RepositoryError, Result};
use crate::repolens::repository_manager::RepositoryIdentifier;

pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";

const USER_AGENT: &str = "repolens-mcp/0.1.0 (https://github.com/tacogips/repolens-mcp)";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONTRIBUTOR_LIMIT: usize = 10;
/// GitHub caps `per_page` at 100.
const MAX_PER_PAGE: usize = 100;

/// Client for the GitHub REST API plus git content transfer
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    github_token: Option<String>,
    api_base_url: String,
    clone_timeout: Duration,
}

impl GithubClient {
    /// Creates a client against api.github.com
    ///
    /// # Errors
    ///
    /// Fails only if the underlying HTTP client cannot be constructed.
    pub fn new(github_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                RepositoryError::RemoteUnavailable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            github_token: github_token.filter(|t| !t.trim().is_empty()),
            api_base_url: GITHUB_API_BASE_URL.to_string(),
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
        })
    }

    /// Points REST calls at another base URL (GitHub Enterprise or a mock server)
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_clone_timeout(mut self, clone_timeout: Duration) -> Self {
        self.clone_timeout = clone_timeout;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.github_token.is_some()
    }

    /// Sends a GET request and maps GitHub's failure statuses onto the error taxonomy
    async fn get(
        &self,
        identifier: &RepositoryIdentifier,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response> {
        let url = format!("{}{}", self.api_base_url, path);
        let mut req_builder = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .query(query);

        if let Some(token) = &self.github_token {
            req_builder = req_builder.header("Authorization", format!("token {}", token));
        }

        tracing::debug!("GET {}", url);
        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RepositoryError::RemoteUnavailable(format!("request to {} timed out", url))
            } else {
                RepositoryError::RemoteUnavailable(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        let quota = RateLimitStatus::from_headers(response.headers());

        if let Some(reset_at) = quota.exhausted_reset_at(status, Utc::now()) {
            tracing::warn!(
                "GitHub rate limit exhausted for {}, resets at {}",
                identifier,
                reset_at
            );
            return Err(RepositoryError::RateLimitExceeded { reset_at });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(RepositoryError::RepositoryNotFound(identifier.full_name()));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RepositoryError::RemoteUnavailable(format!(
                "GitHub API error {}: {}",
                status, error_text
            )));
        }

        if quota.remaining == Some(0) {
            tracing::warn!("GitHub rate limit quota is now exhausted");
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        identifier: &RepositoryIdentifier,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.get(identifier, path, query).await?;
        parse_json(response).await
    }

    /// Like [`Self::get_json`] for list endpoints, treating `204 No Content` as empty
    async fn get_json_list<T: DeserializeOwned>(
        &self,
        identifier: &RepositoryIdentifier,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self.get(identifier, path, query).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        parse_json(response).await
    }

    async fn fetch_issues(
        &self,
        identifier: &RepositoryIdentifier,
        limit: usize,
    ) -> Result<Vec<ActivityItem>> {
        // The issues endpoint also returns pull requests; over-fetch so filtering leaves enough.
        let per_page = (limit * 2).clamp(1, MAX_PER_PAGE);
        let items: Vec<GithubIssueResponse> = self
            .get_json_list(
                identifier,
                &format!("/repos/{}/issues", identifier.full_name()),
                &activity_query(per_page),
            )
            .await?;

        Ok(items
            .into_iter()
            .filter(|item| item.pull_request.is_none())
            .take(limit)
            .map(|item| item.into_activity(false))
            .collect())
    }

    async fn fetch_pull_requests(
        &self,
        identifier: &RepositoryIdentifier,
        limit: usize,
    ) -> Result<Vec<ActivityItem>> {
        let per_page = limit.clamp(1, MAX_PER_PAGE);
        let items: Vec<GithubIssueResponse> = self
            .get_json_list(
                identifier,
                &format!("/repos/{}/pulls", identifier.full_name()),
                &activity_query(per_page),
            )
            .await?;

        Ok(items
            .into_iter()
            .take(limit)
            .map(|item| item.into_activity(true))
            .collect())
    }

    async fn fetch_contributors(
        &self,
        identifier: &RepositoryIdentifier,
    ) -> Result<Vec<ContributorRecord>> {
        let items: Vec<GithubContributorResponse> = self
            .get_json_list(
                identifier,
                &format!("/repos/{}/contributors", identifier.full_name()),
                &[("per_page", CONTRIBUTOR_LIMIT.to_string())],
            )
            .await?;

        Ok(items
            .into_iter()
            .filter_map(|c| {
                c.login.map(|login| ContributorRecord {
                    login,
                    contribution_count: c.contributions,
                })
            })
            .take(CONTRIBUTOR_LIMIT)
            .collect())
    }
}

#[async_trait]
impl RemoteSource for GithubClient {
    async fn fetch_metadata(
        &self,
        identifier: &RepositoryIdentifier,
    ) -> Result<RepositoryMetadata> {
        let repo: GithubRepositoryResponse = self
            .get_json(
                identifier,
                &format!("/repos/{}", identifier.full_name()),
                &[],
            )
            .await?;
        Ok(repo.into_metadata())
    }

    async fn fetch_content(
        &self,
        identifier: &RepositoryIdentifier,
        metadata: &RepositoryMetadata,
        destination: &Path,
    ) -> Result<String> {
        let clone_url = if metadata.clone_url.is_empty() {
            identifier.clone_url()
        } else {
            metadata.clone_url.clone()
        };
        git_clone::shallow_clone(&clone_url, destination, self.clone_timeout).await
    }

    async fn fetch_activity(
        &self,
        identifier: &RepositoryIdentifier,
        limit: usize,
    ) -> Result<RepositoryActivity> {
        // A snapshot is all-or-nothing: any failing endpoint fails the refresh,
        // which then falls back to the previous mirror.
        let (issues, pull_requests, contributors) = tokio::try_join!(
            self.fetch_issues(identifier, limit),
            self.fetch_pull_requests(identifier, limit),
            self.fetch_contributors(identifier)
        )?;

        Ok(RepositoryActivity {
            issues,
            pull_requests,
            contributors,
        })
    }
}

fn activity_query(per_page: usize) -> [(&'static str, String); 4] {
    [
        ("state", "all".to_string()),
        ("sort", "updated".to_string()),
        ("direction", "desc".to_string()),
        ("per_page", per_page.to_string()),
    ]
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        RepositoryError::RemoteUnavailable(format!("failed to parse GitHub response: {}", e))
    })
}

/// Quota signals carried by a GitHub response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RateLimitStatus {
    remaining: Option<u64>,
    reset_epoch_seconds: Option<i64>,
    retry_after_seconds: Option<i64>,
}

impl RateLimitStatus {
    fn from_headers(headers: &HeaderMap) -> Self {
        fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        }

        Self {
            remaining: parse(headers, "x-ratelimit-remaining"),
            reset_epoch_seconds: parse(headers, "x-ratelimit-reset"),
            retry_after_seconds: parse(headers, "retry-after"),
        }
    }

    /// Reset time when `status` signals an exhausted quota, `None` otherwise
    ///
    /// A 403 only counts as rate limiting when the remaining quota is zero;
    /// other 403s (blocked repository, missing permission) are ordinary failures.
    fn exhausted_reset_at(&self, status: StatusCode, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let limited = match status {
            StatusCode::TOO_MANY_REQUESTS => true,
            StatusCode::FORBIDDEN => {
                self.remaining == Some(0) || self.retry_after_seconds.is_some()
            }
            _ => false,
        };
        if !limited {
            return None;
        }

        let reset_at = self
            .reset_epoch_seconds
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.retry_after_seconds
                    .map(|secs| now + chrono::Duration::seconds(secs))
            })
            .unwrap_or(now);
        Some(reset_at)
    }
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubRepositoryResponse {
    name: String,
    full_name: String,
    owner: GithubUser,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    language: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    clone_url: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    pushed_at: Option<DateTime<Utc>>,
}

impl GithubRepositoryResponse {
    fn into_metadata(self) -> RepositoryMetadata {
        RepositoryMetadata {
            owner: self.owner.login,
            name: self.name,
            full_name: self.full_name,
            description: self.description,
            stars: self.stargazers_count,
            forks: self.forks_count,
            language: self.language,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
            clone_url: self.clone_url.unwrap_or_default(),
            updated_at: self.updated_at,
            pushed_at: self.pushed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubIssueResponse {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    user: Option<GithubUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    html_url: String,
    /// Present only when the issue is a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GithubIssueResponse {
    fn into_activity(self, is_pull_request: bool) -> ActivityItem {
        ActivityItem {
            number: self.number,
            title: self.title,
            body: self.body,
            state: self.state,
            author: self
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            url: self.html_url,
            is_pull_request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GithubContributorResponse {
    /// Anonymous contributors have no login
    login: Option<String>,
    #[serde(default)]
    contributions: u64,
}
