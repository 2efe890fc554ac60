pub mod git_clone;
pub mod github;
pub mod models;

use std::path::Path;

use async_trait::async_trait;

pub use github::GithubClient;
pub use models::*;

use super::RepositoryIdentifier;
use crate::repolens::errors::Result;

/// Access to a remote repository host
///
/// Every call is rate-limit aware: when the host reports an exhausted quota the
/// call fails with `RateLimitExceeded` carrying the reset time instead of
/// retrying. Retrying is left to the caller.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_metadata(&self, identifier: &RepositoryIdentifier)
    -> Result<RepositoryMetadata>;

    /// Materializes the repository content into `destination`, which must not exist yet
    ///
    /// Returns the commit reference the content was checked out at.
    async fn fetch_content(
        &self,
        identifier: &RepositoryIdentifier,
        metadata: &RepositoryMetadata,
        destination: &Path,
    ) -> Result<String>;

    /// Fetches up to `limit` recent issues and pull requests (each) plus the top contributors
    async fn fetch_activity(
        &self,
        identifier: &RepositoryIdentifier,
        limit: usize,
    ) -> Result<RepositoryActivity>;
}
