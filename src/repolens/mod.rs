//! Repository acquisition, caching, indexing and validated file access
//!
//! A request naming a repository always goes through the
//! [`RepositoryManager`] first. It guarantees a fresh-enough local mirror
//! exists (fetching through a [`RemoteSource`] when the cached one is stale or
//! missing) before the [`SearchIndex`] or a [`LocalRepository`] read touches it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use repolens_mcp::repolens::{GithubClient, RepositoryIdentifier, RepositoryManager};
//! use repolens_mcp::repolens::config::RepositoryManagerConfig;
//!
//! # async fn run() -> repolens_mcp::repolens::Result<()> {
//! let remote = Arc::new(GithubClient::new(None)?);
//! let manager = RepositoryManager::new(RepositoryManagerConfig::from_env(), remote)?;
//!
//! let id = RepositoryIdentifier::parse("https://github.com/tokio-rs/tokio")?;
//! let fresh = manager.ensure_fresh(&id).await?;
//! println!("{}", fresh.entry.local_root_path.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod local_repository;
pub mod repository_manager;
pub mod search_index;

pub use errors::{ErrorKind, ErrorResponse, RepositoryError, Result};
pub use local_repository::{FileContents, FileDescriptor, LocalRepository};
pub use repository_manager::providers::{GithubClient, RemoteSource};
pub use repository_manager::{CacheEntry, Freshness, RepositoryIdentifier, RepositoryManager};
pub use search_index::{IndexedDocument, SearchIndex, SourceKind};
