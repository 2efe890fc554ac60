//! Validated access to a mirror's files
//!
//! Every path handed in by a caller goes through two checks before anything is
//! read:
//!
//! 1. [`prevent_directory_traversal`] normalizes it lexically and rejects `..`
//!    segments (also URL-encoded ones) without touching the filesystem.
//! 2. The joined path is canonicalized and must still live under the
//!    canonical mirror root, which catches symlinks pointing outside.
//!
//! The mirror is treated as untrusted on every access: files are re-stat'ed
//! before each read rather than trusting anything observed at fetch time.

pub mod language;
mod tree;

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use language::detect_language;
pub use tree::{NodeType, RepositoryTree, TreeNode, TreeStats};

use crate::repolens::errors::{RepositoryError, Result};

/// Share of printable bytes required before undecodable text is accepted as Latin-1.
const MIN_PRINTABLE_RATIO: f64 = 0.7;

/// Metadata of a file read from a mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Normalized path relative to the repository root, `/`-separated
    pub relative_path: String,
    pub size_bytes: u64,
    pub detected_language: Option<String>,
    pub encoding: String,
}

/// A successfully decoded text file, always complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub descriptor: FileDescriptor,
    pub content: String,
}

/// A materialized repository checkout on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads a text file below the repository root
    ///
    /// # Errors
    ///
    /// - `PathTraversalRejected` if the path leaves the root, lexically or through a symlink
    /// - `FileNotFound` if it does not exist or is a directory
    /// - `FileTooLarge` if it is bigger than `max_size_bytes`; no content is read
    /// - `BinaryFileRejected` if it does not decode as text
    pub fn read_file(&self, relative_path: &str, max_size_bytes: u64) -> Result<FileContents> {
        let normalized = prevent_directory_traversal(relative_path)?;
        if normalized.as_os_str().is_empty() {
            return Err(RepositoryError::FileNotFound(format!(
                "'{}' is the repository root, not a file",
                relative_path
            )));
        }
        let full_path = self.resolve_within_root(&normalized, relative_path)?;
        let display_path = to_slash_path(&normalized);

        let metadata = std::fs::metadata(&full_path).map_err(|e| not_found_or(e, relative_path))?;
        if !metadata.is_file() {
            return Err(RepositoryError::FileNotFound(format!(
                "'{}' is not a file",
                relative_path
            )));
        }
        if metadata.len() > max_size_bytes {
            return Err(RepositoryError::FileTooLarge {
                path: display_path,
                size_bytes: metadata.len(),
                limit_bytes: max_size_bytes,
            });
        }

        let file = std::fs::File::open(&full_path).map_err(|e| not_found_or(e, relative_path))?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        // One byte past the limit detects a file that grew after the stat.
        file.take(max_size_bytes.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max_size_bytes {
            return Err(RepositoryError::FileTooLarge {
                path: display_path,
                size_bytes: bytes.len() as u64,
                limit_bytes: max_size_bytes,
            });
        }

        let (content, encoding) = decode_text(&bytes)
            .ok_or_else(|| RepositoryError::BinaryFileRejected(display_path.clone()))?;

        Ok(FileContents {
            descriptor: FileDescriptor {
                size_bytes: bytes.len() as u64,
                detected_language: detect_language(&normalized).map(str::to_string),
                encoding: encoding.to_string(),
                relative_path: display_path,
            },
            content,
        })
    }

    /// Canonicalizes `normalized` below the root and verifies it did not escape
    fn resolve_within_root(&self, normalized: &Path, requested: &str) -> Result<PathBuf> {
        let canonical_root = self.root.canonicalize().map_err(|e| {
            RepositoryError::CacheCorrupted(format!(
                "repository root {} is unreadable: {}",
                self.root.display(),
                e
            ))
        })?;
        let canonical = canonical_root
            .join(normalized)
            .canonicalize()
            .map_err(|e| not_found_or(e, requested))?;

        if !canonical.starts_with(&canonical_root) {
            tracing::warn!("Rejected path escaping the mirror through a link: {}", requested);
            return Err(RepositoryError::PathTraversalRejected(requested.to_string()));
        }
        Ok(canonical)
    }
}

/// Normalizes a caller-supplied relative path without touching the filesystem
///
/// A leading `/` is treated as the repository root and `.` segments are
/// dropped. Any `..` segment, a URL-encoded dot or separator, a NUL byte or a
/// drive prefix is rejected with `PathTraversalRejected`. An empty result
/// denotes the repository root.
///
/// # Examples
///
/// ```
/// use repolens_mcp::repolens::local_repository::prevent_directory_traversal;
/// use std::path::PathBuf;
///
/// assert_eq!(prevent_directory_traversal("/src/./lib.rs").unwrap(), PathBuf::from("src/lib.rs"));
/// assert!(prevent_directory_traversal("../../etc/passwd").is_err());
/// assert!(prevent_directory_traversal("docs/%2e%2e/secret").is_err());
/// ```
pub fn prevent_directory_traversal(relative_path: &str) -> Result<PathBuf> {
    let rejected = || RepositoryError::PathTraversalRejected(relative_path.to_string());

    if relative_path.contains('\0') {
        return Err(rejected());
    }
    // Percent-encoded structural characters never reach the filesystem.
    let decoded = urlencoding::decode(relative_path).map_err(|_| rejected())?;
    let structural = |s: &str| {
        s.chars()
            .filter(|c| matches!(c, '.' | '/' | '\\' | '\0'))
            .count()
    };
    if structural(&decoded) != structural(relative_path) {
        return Err(rejected());
    }
    // Backslashes are separators on some hosts; a `..` between them is still a traversal.
    if relative_path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(rejected());
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(relative_path).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(segment) => normalized.push(segment),
            Component::ParentDir | Component::Prefix(_) => return Err(rejected()),
        }
    }
    Ok(normalized)
}

fn not_found_or(err: std::io::Error, requested: &str) -> RepositoryError {
    match err.kind() {
        std::io::ErrorKind::NotFound => RepositoryError::FileNotFound(requested.to_string()),
        _ => RepositoryError::storage(&format!("failed to access '{}'", requested), err),
    }
}

pub(crate) fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Decodes `bytes` as text, returning the content and the encoding name
///
/// `None` means the bytes look binary: a NUL byte outside UTF-16, or a
/// non-UTF-8 payload that is not predominantly printable.
fn decode_text(bytes: &[u8]) -> Option<(String, &'static str)> {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes).map(|s| (s, "utf-16le"));
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes).map(|s| (s, "utf-16be"));
    }
    if bytes.contains(&0) {
        return None;
    }

    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(body) {
        return Some((text.to_string(), "utf-8"));
    }

    let has_control = body
        .iter()
        .any(|&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B)) || b == 0x7F);
    let printable = body
        .iter()
        .filter(|&&b| (0x20..0x7F).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    if has_control || (printable as f64) < MIN_PRINTABLE_RATIO * body.len() as f64 {
        return None;
    }
    // Latin-1 maps every byte to the code point of the same value.
    Some((body.iter().map(|&b| b as char).collect(), "iso-8859-1"))
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}
