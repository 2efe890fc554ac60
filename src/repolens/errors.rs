//! Error taxonomy for repository acquisition, caching, indexing and file access
//!
//! Every fallible operation in the core returns [`RepositoryError`]. The tool
//! layer never forwards a bare error string: it renders the error through
//! [`ErrorResponse`], which carries the closed [`ErrorKind`] as its `error`
//! field so callers can branch on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Closed set of error kinds surfaced to callers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ErrorKind {
    RepositoryNotFound,
    RateLimitExceeded,
    RemoteUnavailable,
    PathTraversalRejected,
    FileTooLarge,
    BinaryFileRejected,
    InvalidIdentifier,
    CacheCorrupted,
    FileNotFound,
    InvalidArgument,
    Storage,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// Remote quota exhausted. Never retried by the core.
    #[error("GitHub API rate limit exceeded, resets at {}", .reset_at.to_rfc3339())]
    RateLimitExceeded { reset_at: DateTime<Utc> },

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Path traversal rejected: {0}")]
    PathTraversalRejected(String),

    #[error("File exceeds {} limit", human_size(.limit_bytes))]
    FileTooLarge {
        path: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Binary file rejected: {0}")]
    BinaryFileRejected(String),

    #[error("Invalid repository identifier: {0}")]
    InvalidIdentifier(String),

    /// The on-disk mirror for an entry is missing or unreadable.
    #[error("Cache corrupted: {0}")]
    CacheCorrupted(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::RepositoryNotFound(_) => ErrorKind::RepositoryNotFound,
            RepositoryError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            RepositoryError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            RepositoryError::PathTraversalRejected(_) => ErrorKind::PathTraversalRejected,
            RepositoryError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            RepositoryError::BinaryFileRejected(_) => ErrorKind::BinaryFileRejected,
            RepositoryError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            RepositoryError::CacheCorrupted(_) => ErrorKind::CacheCorrupted,
            RepositoryError::FileNotFound(_) => ErrorKind::FileNotFound,
            RepositoryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RepositoryError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Builds a storage error from any displayable failure, prefixed with what was being done
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        RepositoryError::Storage(format!("{}: {}", context, err))
    }

    /// Structured representation handed to the calling protocol layer
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

/// Structured error body: `{"error": "<Kind>", "message": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&RepositoryError> for ErrorResponse {
    fn from(err: &RepositoryError) -> Self {
        err.to_response()
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

fn human_size(bytes: &u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    match *bytes {
        b if b >= MIB && b % MIB == 0 => format!("{}MB", b / MIB),
        b if b >= KIB && b % KIB == 0 => format!("{}KB", b / KIB),
        b => format!("{} bytes", b),
    }
}
