//! Collects indexable documents from a mirror
//!
//! Documentation comes from a fixed set of well-known files in the checkout;
//! issues and pull requests come from the snapshot stored next to it.

use std::path::Path;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use walkdir::WalkDir;

use crate::repolens::errors::{RepositoryError, Result};
use crate::repolens::repository_manager::RepositoryIdentifier;
use crate::repolens::repository_manager::providers::{ActivityItem, RepositorySnapshot};

/// Documentation files above this size are not indexed.
pub const MAX_INDEXED_FILE_BYTES: u64 = 100_000;

const README_FILES: [&str; 4] = ["README.md", "README.rst", "README.txt", "README"];
const ROOT_DOC_FILES: [&str; 4] = ["CONTRIBUTING.md", "CHANGELOG.md", "HISTORY.md", "LICENSE.md"];
const NESTED_DOC_PATTERNS: [&str; 3] = ["docs/**/*.md", "docs/**/*.rst", "documentation/**/*.md"];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    Readme,
    Doc,
    Issue,
    PullRequest,
}

/// A document handed to the index builder, with its full text
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub source_kind: SourceKind,
    /// Relative path for files, number for issues and pull requests
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Gathers every indexable document of one mirror generation
///
/// Unreadable, oversized or non-UTF-8 documentation files are skipped.
pub fn collect_documents(
    repository: &RepositoryIdentifier,
    checkout: &Path,
    snapshot: &RepositorySnapshot,
) -> Result<Vec<SourceDocument>> {
    let branch = &snapshot.metadata.default_branch;
    let updated_at = snapshot.metadata.pushed_at.or(snapshot.metadata.updated_at);
    let file_doc = |kind: SourceKind, relative: String| {
        read_indexable(&checkout.join(&relative)).map(|body| SourceDocument {
            source_kind: kind,
            title: file_title(&relative),
            url: format!("{}/blob/{}/{}", repository.html_url(), branch, relative),
            source_id: relative,
            body,
            updated_at,
        })
    };

    let mut documents: Vec<SourceDocument> = README_FILES
        .iter()
        .filter_map(|name| file_doc(SourceKind::Readme, name.to_string()))
        .collect();

    documents.extend(
        ROOT_DOC_FILES
            .iter()
            .filter_map(|name| file_doc(SourceKind::Doc, name.to_string())),
    );

    let nested = nested_doc_globs()?;
    for dir in ["docs", "documentation"] {
        let root = checkout.join(dir);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(checkout) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if nested.is_match(&relative) {
                documents.extend(file_doc(SourceKind::Doc, relative));
            }
        }
    }

    documents.extend(
        snapshot
            .activity
            .issues
            .iter()
            .map(|item| activity_document(SourceKind::Issue, item)),
    );
    documents.extend(
        snapshot
            .activity
            .pull_requests
            .iter()
            .map(|item| activity_document(SourceKind::PullRequest, item)),
    );

    tracing::debug!(
        "Collected {} documents for {} from {}",
        documents.len(),
        repository,
        checkout.display()
    );
    Ok(documents)
}

fn nested_doc_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in NESTED_DOC_PATTERNS {
        let glob = Glob::new(pattern)
            .map_err(|e| RepositoryError::storage("invalid documentation pattern", e))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RepositoryError::storage("invalid documentation patterns", e))
}

fn read_indexable(path: &Path) -> Option<String> {
    // symlink_metadata: a symlinked doc could point outside the mirror.
    let metadata = std::fs::symlink_metadata(path).ok()?;
    if !metadata.is_file() || metadata.len() > MAX_INDEXED_FILE_BYTES {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    String::from_utf8(bytes).ok()
}

fn file_title(relative: &str) -> String {
    relative
        .rsplit('/')
        .next()
        .unwrap_or(relative)
        .to_string()
}

fn activity_document(kind: SourceKind, item: &ActivityItem) -> SourceDocument {
    let body = match &item.body {
        Some(body) if !body.trim().is_empty() => format!("{}\n\n{}", item.title, body),
        _ => item.title.clone(),
    };
    SourceDocument {
        source_kind: kind,
        source_id: item.number.to_string(),
        title: format!("#{} {}", item.number, item.title),
        body,
        url: item.url.clone(),
        updated_at: Some(item.updated_at),
    }
}

/// First `max_chars` characters of `text`, never splitting a character
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
