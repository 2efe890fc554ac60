//! Shallow clone of a remote repository with gitoxide

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gix::progress::Discard;

use crate::repolens::errors::{RepositoryError, Result};

/// Clones `clone_url` into `destination` with depth 1 and checks out the default branch
///
/// The clone runs on the blocking pool. If it does not finish within `timeout`
/// the caller gets `RemoteUnavailable` and the clone is interrupted; gitoxide
/// removes the partially written destination when the interrupted clone unwinds.
///
/// Returns the hex id of the checked-out HEAD commit.
pub async fn shallow_clone(
    clone_url: &str,
    destination: &Path,
    timeout: Duration,
) -> Result<String> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let url = clone_url.to_string();
    let dest = destination.to_path_buf();
    let task_interrupt = Arc::clone(&interrupt);

    let handle =
        tokio::task::spawn_blocking(move || clone_blocking(&url, &dest, task_interrupt.as_ref()));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(RepositoryError::RemoteUnavailable(format!(
            "clone task failed: {}",
            join_err
        ))),
        Err(_) => {
            interrupt.store(true, Ordering::Relaxed);
            tracing::warn!(
                "Clone of {} exceeded {}s, abandoning",
                clone_url,
                timeout.as_secs()
            );
            Err(RepositoryError::RemoteUnavailable(format!(
                "clone of {} timed out after {}s",
                clone_url,
                timeout.as_secs()
            )))
        }
    }
}

fn clone_blocking(url: &str, destination: &Path, interrupt: &AtomicBool) -> Result<String> {
    tracing::info!("Cloning {} into {}", url, destination.display());

    let mut prepare = gix::prepare_clone(url, destination)
        .map_err(|e| clone_failure(url, "prepare", e))?
        .with_shallow(gix::remote::fetch::Shallow::DepthAtRemote(NonZeroU32::MIN));

    let (mut checkout, _outcome) = prepare
        .fetch_then_checkout(Discard, interrupt)
        .map_err(|e| clone_failure(url, "fetch", e))?;

    let (repo, _stats) = checkout
        .main_worktree(Discard, interrupt)
        .map_err(|e| clone_failure(url, "checkout", e))?;

    let head = repo
        .head_id()
        .map_err(|e| clone_failure(url, "resolve HEAD", e))?;

    Ok(head.to_string())
}

fn clone_failure(url: &str, stage: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::RemoteUnavailable(format!("failed to {} {}: {}", stage, url, err))
}
