//! Provider-neutral records fetched from the remote repository host
//!
//! These are the shapes the rest of the crate works with. Host-specific wire
//! formats are converted into them inside each provider module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub owner: String,
    pub name: String,
    /// `owner/name` as reported by the host (may differ in case from the request)
    pub full_name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub default_branch: String,
    pub clone_url: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// An issue or a pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub number: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub state: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    #[serde(default)]
    pub is_pull_request: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorRecord {
    pub login: String,
    pub contribution_count: u64,
}

/// Recent issues, pull requests and contributors of one repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryActivity {
    pub issues: Vec<ActivityItem>,
    pub pull_requests: Vec<ActivityItem>,
    pub contributors: Vec<ContributorRecord>,
}

/// Everything fetched alongside the content, persisted inside the mirror
///
/// The search index is rebuilt from the checkout plus this snapshot, so a
/// mirror is self-sufficient without further remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub metadata: RepositoryMetadata,
    #[serde(flatten)]
    pub activity: RepositoryActivity,
}
