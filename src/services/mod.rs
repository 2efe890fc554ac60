//! The verbs offered to callers, independent of any protocol
//!
//! Each function takes the [`RepositoryManager`] explicitly and does not touch
//! global state, so the tool layer, the CLI and tests all call the same code.
//! Every verb validates its arguments, then calls
//! [`RepositoryManager::ensure_fresh`] before reading the mirror. A mirror
//! that turns out to be unreadable mid-request is re-fetched once.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repolens::config::{
    DEFAULT_SEARCH_LIMIT, DEFAULT_TREE_DEPTH, MAX_TREE_DEPTH, RepositoryManagerConfig,
    github_token_from_env,
};
use crate::repolens::local_repository::{
    LocalRepository, TreeNode, TreeStats, prevent_directory_traversal,
};
use crate::repolens::repository_manager::providers::{
    ActivityItem, ContributorRecord, RepositoryMetadata, RepositorySnapshot,
};
use crate::repolens::search_index::documents::excerpt;
use crate::repolens::{
    CacheEntry, GithubClient, IndexedDocument, RepositoryError, RepositoryIdentifier,
    RepositoryManager, Result, SourceKind,
};

/// Contributors listed in search results and summaries.
pub const TOP_CONTRIBUTORS: usize = 10;
/// Issues and pull requests listed in a summary (each).
pub const SUMMARY_ACTIVITY_ITEMS: usize = 5;
/// Characters of README text in a summary.
pub const README_SUMMARY_CHARS: usize = 500;

const README_CANDIDATES: [&str; 4] = ["README.md", "README.rst", "README.txt", "README"];

/// Headline facts about a repository, attached to search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
}

impl From<&RepositoryMetadata> for RepositoryInfo {
    fn from(metadata: &RepositoryMetadata) -> Self {
        Self {
            name: metadata.full_name.clone(),
            description: metadata.description.clone(),
            stars: metadata.stars,
            forks: metadata.forks,
            language: metadata.language.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub repository: RepositoryInfo,
    pub documents: Vec<IndexedDocument>,
    pub issues: Vec<IndexedDocument>,
    pub pull_requests: Vec<IndexedDocument>,
    pub contributors: Vec<ContributorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureOutput {
    /// The requested start path, `/` for the repository root
    pub root: String,
    pub structure: Vec<TreeNode>,
    pub stats: TreeStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOutput {
    pub path: String,
    pub language: Option<String>,
    pub size: u64,
    pub encoding: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Repository details shown in a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDetails {
    pub name: String,
    pub description: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub language: Option<String>,
    pub default_branch: String,
    pub url: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Compact form of an issue or pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub author: String,
    pub updated_at: DateTime<Utc>,
    pub url: String,
}

impl From<&ActivityItem> for ActivitySummary {
    fn from(item: &ActivityItem) -> Self {
        Self {
            number: item.number,
            title: item.title.clone(),
            state: item.state.clone(),
            author: item.author.clone(),
            updated_at: item.updated_at,
            url: item.url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub repository: RepositoryDetails,
    pub readme_summary: Option<String>,
    pub recent_issues: Vec<ActivitySummary>,
    pub recent_pull_requests: Vec<ActivitySummary>,
    pub top_contributors: Vec<ContributorRecord>,
    pub languages: BTreeMap<String, usize>,
    pub total_files: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheOutput {
    /// `owner/name` of every repository that had cached state
    pub cleared: Vec<String>,
}

/// Builds a manager backed by GitHub from the environment
///
/// Explicit arguments (usually CLI flags) take precedence over
/// `REPOLENS_MCP_CACHE_DIR`, `REPOLENS_MCP_CACHE_TTL_SECONDS` and the token
/// variables.
pub fn build_manager(
    github_token: Option<String>,
    cache_dir: Option<PathBuf>,
    ttl_seconds: Option<u64>,
) -> Result<RepositoryManager> {
    let mut config = RepositoryManagerConfig::from_env();
    if let Some(cache_dir) = cache_dir {
        config.cache_root = cache_dir;
    }
    if let Some(ttl_seconds) = ttl_seconds {
        config.ttl_seconds = ttl_seconds;
    }

    let client = GithubClient::new(github_token.or_else(github_token_from_env))?
        .with_clone_timeout(config.clone_timeout);
    if !client.is_authenticated() {
        tracing::info!("No GitHub token configured, unauthenticated rate limits apply");
    }
    RepositoryManager::new(config, Arc::new(client))
}

/// Full-text search over a repository's documentation, issues and pull requests
///
/// The index for the current mirror generation is built on first use.
///
/// # Errors
///
/// `InvalidArgument` for a blank query or a limit below 1, before any fetch
/// happens. Otherwise whatever acquiring the mirror or querying the index
/// reports.
pub async fn search(
    manager: &RepositoryManager,
    repository: &str,
    query: &str,
    limit: Option<i64>,
) -> Result<SearchOutput> {
    let identifier = RepositoryIdentifier::parse(repository)?;
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if limit <= 0 {
        return Err(RepositoryError::InvalidArgument(format!(
            "limit must be positive, got {}",
            limit
        )));
    }
    if query.trim().is_empty() {
        return Err(RepositoryError::InvalidArgument(
            "query must not be empty".to_string(),
        ));
    }

    let id = &identifier;
    let ((snapshot, hits), warning) = on_mirror(manager, id, move |entry| {
        search_generation(manager, id, entry, query, limit)
    })
    .await?;

    let mut documents = Vec::new();
    let mut issues = Vec::new();
    let mut pull_requests = Vec::new();
    for hit in hits {
        match hit.source_kind {
            SourceKind::Readme | SourceKind::Doc => documents.push(hit),
            SourceKind::Issue => issues.push(hit),
            SourceKind::PullRequest => pull_requests.push(hit),
        }
    }

    Ok(SearchOutput {
        repository: RepositoryInfo::from(&snapshot.metadata),
        documents,
        issues,
        pull_requests,
        contributors: top_contributors(&snapshot),
        warning,
    })
}

/// Directory tree of a repository below `path`, `depth` levels deep
///
/// `depth` defaults to 4 and is clamped to 10; negative values are rejected.
pub async fn structure(
    manager: &RepositoryManager,
    repository: &str,
    path: Option<&str>,
    depth: Option<i64>,
) -> Result<StructureOutput> {
    let identifier = RepositoryIdentifier::parse(repository)?;
    let depth = match depth {
        None => DEFAULT_TREE_DEPTH,
        Some(d) if d < 0 => {
            return Err(RepositoryError::InvalidArgument(format!(
                "depth must not be negative, got {}",
                d
            )));
        }
        Some(d) => usize::try_from(d).unwrap_or(MAX_TREE_DEPTH).min(MAX_TREE_DEPTH),
    };
    let start = path.unwrap_or("").to_string();
    prevent_directory_traversal(&start)?;

    let walk = move |entry: &CacheEntry| {
        LocalRepository::new(entry.local_root_path.clone()).walk(&start, depth)
    };
    let (tree, warning) = on_mirror(manager, &identifier, |entry| {
        run_blocking(walk.clone(), entry)
    })
    .await?;

    Ok(StructureOutput {
        root: if tree.root.is_empty() {
            "/".to_string()
        } else {
            tree.root
        },
        structure: tree.structure,
        stats: tree.stats,
        warning,
    })
}

/// Contents of one text file of a repository
///
/// Traversal attempts are rejected before the mirror is even acquired.
pub async fn read(manager: &RepositoryManager, repository: &str, path: &str) -> Result<ReadOutput> {
    let identifier = RepositoryIdentifier::parse(repository)?;
    prevent_directory_traversal(path)?;

    let max_size = manager.config().max_file_size_bytes;
    let requested = path.to_string();
    let read_file = move |entry: &CacheEntry| {
        LocalRepository::new(entry.local_root_path.clone()).read_file(&requested, max_size)
    };
    let (file, warning) = on_mirror(manager, &identifier, |entry| {
        run_blocking(read_file.clone(), entry)
    })
    .await?;

    Ok(ReadOutput {
        path: file.descriptor.relative_path,
        language: file.descriptor.detected_language,
        size: file.descriptor.size_bytes,
        encoding: file.descriptor.encoding,
        content: file.content,
        warning,
    })
}

/// Overview of a repository: metadata, README excerpt, recent activity and language mix
pub async fn summary(manager: &RepositoryManager, repository: &str) -> Result<SummaryOutput> {
    let identifier = RepositoryIdentifier::parse(repository)?;
    let loader = manager.clone();
    let max_size = manager.config().max_file_size_bytes;

    let overview = move |entry: &CacheEntry| {
        let snapshot = loader.load_snapshot(entry)?;
        let local = LocalRepository::new(entry.local_root_path.clone());
        let readme = readme_summary(&local, max_size)?;
        let tree = local.walk("", MAX_TREE_DEPTH)?;
        Ok((snapshot, readme, tree))
    };
    let ((snapshot, readme, tree), warning) = on_mirror(manager, &identifier, |entry| {
        run_blocking(overview.clone(), entry)
    })
    .await?;

    let metadata = &snapshot.metadata;
    Ok(SummaryOutput {
        repository: RepositoryDetails {
            name: metadata.full_name.clone(),
            description: metadata.description.clone(),
            stars: metadata.stars,
            forks: metadata.forks,
            language: metadata.language.clone(),
            default_branch: metadata.default_branch.clone(),
            url: identifier.html_url(),
            updated_at: metadata.updated_at,
        },
        readme_summary: readme,
        recent_issues: most_recent(&snapshot.activity.issues),
        recent_pull_requests: most_recent(&snapshot.activity.pull_requests),
        top_contributors: top_contributors(&snapshot),
        languages: tree.stats.languages,
        total_files: tree.stats.total_files,
        warning,
    })
}

/// Drops cached state for one repository, or for all of them when `repository` is `None`
pub async fn clear_cache(
    manager: &RepositoryManager,
    repository: Option<&str>,
) -> Result<ClearCacheOutput> {
    let cleared = match repository {
        Some(repository) => {
            let identifier = RepositoryIdentifier::parse(repository)?;
            if manager.clear(&identifier).await? {
                vec![identifier.full_name()]
            } else {
                Vec::new()
            }
        }
        None => manager
            .clear_all()
            .await?
            .iter()
            .map(RepositoryIdentifier::full_name)
            .collect(),
    };
    Ok(ClearCacheOutput { cleared })
}

/// Runs `op` against a fresh mirror
///
/// When `op` finds the mirror unreadable, e.g. removed by a concurrent clear
/// or refresh, the mirror is re-fetched and `op` runs once more. Returns the
/// stale-mirror warning, if any, next to the value.
async fn on_mirror<T, F, Fut>(
    manager: &RepositoryManager,
    identifier: &RepositoryIdentifier,
    op: F,
) -> Result<(T, Option<String>)>
where
    F: Fn(CacheEntry) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let fresh = manager.ensure_fresh(identifier).await?;
    match op(fresh.entry.clone()).await {
        Err(RepositoryError::CacheCorrupted(reason)) => {
            tracing::warn!("Mirror of {} unreadable ({}), re-fetching", identifier, reason);
            let recovered = manager.recover_corrupted(identifier, &fresh.entry).await?;
            let value = op(recovered.entry).await?;
            Ok((value, recovered.warning))
        }
        other => other.map(|value| (value, fresh.warning)),
    }
}

/// Loads the snapshot of one generation, indexes it if needed and queries it
async fn search_generation(
    manager: &RepositoryManager,
    identifier: &RepositoryIdentifier,
    entry: CacheEntry,
    query: &str,
    limit: i64,
) -> Result<(RepositorySnapshot, Vec<IndexedDocument>)> {
    let loader = manager.clone();
    let load = move |e: &CacheEntry| loader.load_snapshot(e);
    let snapshot = run_blocking(load, entry.clone()).await?;

    let index = manager.search_index();
    index.ensure_built(identifier, &entry, &snapshot).await?;
    let hits = index
        .query(identifier, &entry.generation, query, limit)
        .await?;
    Ok((snapshot, hits))
}

async fn run_blocking<T, F>(op: F, entry: CacheEntry) -> Result<T>
where
    T: Send + 'static,
    F: Fn(&CacheEntry) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&entry))
        .await
        .map_err(|e| RepositoryError::storage("mirror task failed", e))?
}

fn readme_summary(local: &LocalRepository, max_size: u64) -> Result<Option<String>> {
    for candidate in README_CANDIDATES {
        match local.read_file(candidate, max_size) {
            Ok(file) => {
                let text = file.content.trim();
                let mut summary = excerpt(text, README_SUMMARY_CHARS);
                if summary.len() < text.len() {
                    summary.push_str("...");
                }
                return Ok(Some(summary));
            }
            Err(RepositoryError::CacheCorrupted(reason)) => {
                return Err(RepositoryError::CacheCorrupted(reason));
            }
            Err(e) => tracing::debug!("No usable {}: {}", candidate, e),
        }
    }
    Ok(None)
}

fn most_recent(items: &[ActivityItem]) -> Vec<ActivitySummary> {
    let mut sorted: Vec<&ActivityItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.number.cmp(&a.number)));
    sorted
        .into_iter()
        .take(SUMMARY_ACTIVITY_ITEMS)
        .map(ActivitySummary::from)
        .collect()
}

fn top_contributors(snapshot: &RepositorySnapshot) -> Vec<ContributorRecord> {
    let mut contributors = snapshot.activity.contributors.clone();
    contributors.sort_by(|a, b| {
        b.contribution_count
            .cmp(&a.contribution_count)
            .then_with(|| a.login.cmp(&b.login))
    });
    contributors.truncate(TOP_CONTRIBUTORS);
    contributors
}
