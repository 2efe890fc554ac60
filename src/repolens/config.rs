//! Runtime configuration for the repository cache
//!
//! Only three knobs come from the environment:
//!
//! ```bash
//! export REPOLENS_MCP_CACHE_DIR=/var/cache/repolens   # cache root
//! export REPOLENS_MCP_CACHE_TTL_SECONDS=3600          # mirror time-to-live
//! export REPOLENS_MCP_GITHUB_TOKEN=your_github_token  # optional, GITHUB_TOKEN is the fallback
//! ```
//!
//! The token only feeds the remote source client. Without one, the GitHub
//! API allows 60 requests/hour instead of 5,000.

use std::path::PathBuf;
use std::time::Duration;

pub const CACHE_DIR_ENV: &str = "REPOLENS_MCP_CACHE_DIR";
pub const CACHE_TTL_ENV: &str = "REPOLENS_MCP_CACHE_TTL_SECONDS";
pub const GITHUB_TOKEN_ENV: &str = "REPOLENS_MCP_GITHUB_TOKEN";
pub const GITHUB_TOKEN_FALLBACK_ENV: &str = "GITHUB_TOKEN";

pub const DEFAULT_TTL_SECONDS: u64 = 86_400;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);
/// Issues and pull requests fetched per refresh (each).
pub const DEFAULT_ACTIVITY_LIMIT: usize = 30;
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;
pub const DEFAULT_TREE_DEPTH: usize = 4;
pub const MAX_TREE_DEPTH: usize = 10;

/// Settings for [`RepositoryManager`](super::RepositoryManager)
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryManagerConfig {
    /// Root of all on-disk state: mirrors, indexes and the metadata store
    pub cache_root: PathBuf,
    pub ttl_seconds: u64,
    pub max_file_size_bytes: u64,
    pub clone_timeout: Duration,
    pub activity_limit: usize,
}

impl RepositoryManagerConfig {
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            cache_root,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            activity_limit: DEFAULT_ACTIVITY_LIMIT,
        }
    }

    /// Reads the cache root and TTL from the environment, falling back to defaults
    ///
    /// An unparsable TTL value is ignored with a warning rather than failing startup.
    pub fn from_env() -> Self {
        let cache_root = std::env::var_os(CACHE_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_root);

        let mut config = Self::new(cache_root);
        if let Ok(raw) = std::env::var(CACHE_TTL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ttl) => config.ttl_seconds = ttl,
                Err(e) => tracing::warn!("Ignoring invalid {} value '{}': {}", CACHE_TTL_ENV, raw, e),
            }
        }
        config
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_max_file_size_bytes(mut self, max_file_size_bytes: u64) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self
    }

    pub fn with_clone_timeout(mut self, clone_timeout: Duration) -> Self {
        self.clone_timeout = clone_timeout;
        self
    }

    pub fn mirrors_dir(&self) -> PathBuf {
        self.cache_root.join("repos")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.cache_root.join("index")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.cache_root.join("staging")
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.cache_root.join("metadata.db")
    }
}

impl Default for RepositoryManagerConfig {
    fn default() -> Self {
        Self::new(default_cache_root())
    }
}

/// Token from `REPOLENS_MCP_GITHUB_TOKEN`, then `GITHUB_TOKEN`
pub fn github_token_from_env() -> Option<String> {
    [GITHUB_TOKEN_ENV, GITHUB_TOKEN_FALLBACK_ENV]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("repolens-mcp")
}
