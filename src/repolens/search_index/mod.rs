//! Full-text search over a repository's documentation and activity
//!
//! Each repository generation gets its own tantivy index under
//! `<cache_root>/index/<owner__name>/<generation>`. The index is a disposable
//! projection of the mirror: it is built once per generation, into a staging
//! directory that is renamed into place when complete, and discarded together
//! with the generation it was built from.
//!
//! # Ranking
//!
//! Hits are ordered by BM25 score, descending. Equal scores fall back to the
//! most recently updated document first, then title, then source kind and id,
//! so the same query against the same index always yields the same order.

pub mod documents;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};

pub use documents::{SourceDocument, SourceKind, collect_documents};

use crate::repolens::errors::{RepositoryError, Result};
use crate::repolens::repository_manager::providers::RepositorySnapshot;
use crate::repolens::repository_manager::{CacheEntry, RepositoryIdentifier};

/// Characters of body text kept in each result.
pub const EXCERPT_CHARS: usize = 500;

// Tantivy refuses less than 15MB per indexing thread.
const WRITER_MEMORY_BYTES: usize = 15_000_000;

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub repository: String,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: String,
    pub body_excerpt: String,
    pub url: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
struct IndexFields {
    source_kind: Field,
    source_id: Field,
    title: Field,
    body: Field,
    excerpt: Field,
    url: Field,
    updated_at: Field,
}

impl IndexFields {
    fn schema() -> (Schema, Self) {
        let mut builder = Schema::builder();
        // English stemming, so "configuring" finds "configuration".
        let stemmed = TextOptions::default().set_stored().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let fields = Self {
            source_kind: builder.add_text_field("source_kind", STRING | STORED),
            source_id: builder.add_text_field("source_id", STRING | STORED),
            title: builder.add_text_field("title", stemmed.clone()),
            body: builder.add_text_field("body", stemmed),
            excerpt: builder.add_text_field("excerpt", STORED),
            url: builder.add_text_field("url", STORED),
            updated_at: builder.add_text_field("updated_at", STORED),
        };
        (builder.build(), fields)
    }

    fn resolve(schema: &Schema) -> Result<Self> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|e| RepositoryError::storage("index schema mismatch", e))
        };
        Ok(Self {
            source_kind: field("source_kind")?,
            source_id: field("source_id")?,
            title: field("title")?,
            body: field("body")?,
            excerpt: field("excerpt")?,
            url: field("url")?,
            updated_at: field("updated_at")?,
        })
    }
}

/// Owner of every per-repository index below one root directory
///
/// Builds and removals of one repository's indexes are serialized by a
/// per-repository lock. The mirror cache takes the same lock while it deletes
/// a generation, so a build never reads a checkout that is being removed.
pub struct SearchIndex {
    root: PathBuf,
    build_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    builds_completed: AtomicUsize,
}

impl SearchIndex {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            build_locks: Mutex::new(HashMap::new()),
            builds_completed: AtomicUsize::new(0),
        }
    }

    /// Number of index builds finished by this instance
    pub fn builds_completed(&self) -> usize {
        self.builds_completed.load(AtomicOrdering::SeqCst)
    }

    fn repository_dir(&self, repository: &RepositoryIdentifier) -> PathBuf {
        self.root.join(repository.cache_key())
    }

    fn generation_dir(&self, repository: &RepositoryIdentifier, generation: &str) -> PathBuf {
        self.repository_dir(repository).join(generation)
    }

    pub fn is_built(&self, repository: &RepositoryIdentifier, generation: &str) -> bool {
        self.generation_dir(repository, generation)
            .join("meta.json")
            .is_file()
    }

    fn build_lock(&self, repository: &RepositoryIdentifier) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(repository.cache_key()).or_default())
    }

    /// Waits for in-flight builds of `repository` and blocks new ones until dropped
    pub async fn lock_repository(
        &self,
        repository: &RepositoryIdentifier,
    ) -> tokio::sync::OwnedMutexGuard<()> {
        self.build_lock(repository).lock_owned().await
    }

    /// Forgets the build lock of `repository` unless someone still holds it
    pub fn release_lock(&self, repository: &RepositoryIdentifier) {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = repository.cache_key();
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }

    /// Builds the index for `entry`'s generation unless it already exists
    ///
    /// Concurrent calls for the same repository are serialized: the second
    /// caller waits for the first build and then finds it done.
    ///
    /// # Errors
    ///
    /// `CacheCorrupted` when the generation's checkout or snapshot is gone,
    /// e.g. because the repository was cleared or refreshed meanwhile. No
    /// index is written in that case.
    pub async fn ensure_built(
        &self,
        repository: &RepositoryIdentifier,
        entry: &CacheEntry,
        snapshot: &RepositorySnapshot,
    ) -> Result<()> {
        let lock = self.build_lock(repository);
        let _guard = lock.lock().await;

        if self.is_built(repository, &entry.generation) {
            return Ok(());
        }
        // Deletions hold this lock, so the checkout stays put once checked.
        if !entry.local_root_path.is_dir() || !entry.snapshot_path.is_file() {
            return Err(RepositoryError::CacheCorrupted(format!(
                "generation {} of {} was removed before it could be indexed",
                entry.generation, repository
            )));
        }

        let id = repository.clone();
        let checkout = entry.local_root_path.clone();
        let snapshot = snapshot.clone();
        let documents =
            tokio::task::spawn_blocking(move || collect_documents(&id, &checkout, &snapshot))
                .await
                .map_err(|e| RepositoryError::storage("document collection task failed", e))??;

        self.build_unlocked(repository, &entry.generation, documents)
            .await
    }

    /// Builds (or rebuilds) the index of one generation from `documents`
    ///
    /// All-or-nothing: the index becomes visible only once every document is
    /// committed. Rebuilding from the same documents yields an equivalent index.
    pub async fn build(
        &self,
        repository: &RepositoryIdentifier,
        generation: &str,
        documents: Vec<SourceDocument>,
    ) -> Result<()> {
        let lock = self.build_lock(repository);
        let _guard = lock.lock().await;
        self.build_unlocked(repository, generation, documents).await
    }

    async fn build_unlocked(
        &self,
        repository: &RepositoryIdentifier,
        generation: &str,
        documents: Vec<SourceDocument>,
    ) -> Result<()> {
        let repository_dir = self.repository_dir(repository);
        let target = self.generation_dir(repository, generation);
        let count = documents.len();

        tokio::task::spawn_blocking(move || write_index(&repository_dir, &target, documents))
            .await
            .map_err(|e| RepositoryError::storage("index build task failed", e))??;
        self.builds_completed.fetch_add(1, AtomicOrdering::SeqCst);

        tracing::info!(
            "Indexed {} documents for {} (generation {})",
            count,
            repository,
            generation
        );
        Ok(())
    }

    /// Runs `text` against the index of one generation
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `limit` is zero or negative or `text` is blank.
    pub async fn query(
        &self,
        repository: &RepositoryIdentifier,
        generation: &str,
        text: &str,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>> {
        if limit <= 0 {
            return Err(RepositoryError::InvalidArgument(format!(
                "limit must be positive, got {}",
                limit
            )));
        }
        if text.trim().is_empty() {
            return Err(RepositoryError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }

        let dir = self.generation_dir(repository, generation);
        if !dir.join("meta.json").is_file() {
            return Err(RepositoryError::CacheCorrupted(format!(
                "no index for {} generation {}",
                repository, generation
            )));
        }

        let repository_name = repository.full_name();
        let text = text.to_string();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        tokio::task::spawn_blocking(move || run_query(&dir, &repository_name, &text, limit))
            .await
            .map_err(|e| RepositoryError::storage("query task failed", e))?
    }

    /// Drops the index of one generation, if present
    ///
    /// Callers hold [`SearchIndex::lock_repository`] so no build races the removal.
    pub fn remove_generation(&self, repository: &RepositoryIdentifier, generation: &str) {
        remove_dir_quietly(&self.generation_dir(repository, generation));
    }

    /// Drops every index of a repository
    pub fn remove_repository(&self, repository: &RepositoryIdentifier) {
        remove_dir_quietly(&self.repository_dir(repository));
    }
}

fn write_index(repository_dir: &Path, target: &Path, documents: Vec<SourceDocument>) -> Result<()> {
    std::fs::create_dir_all(repository_dir)?;
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(repository_dir)?;

    let (schema, fields) = IndexFields::schema();
    let index = Index::create_in_dir(staging.path(), schema)
        .map_err(|e| RepositoryError::storage("failed to create index", e))?;
    let mut writer: IndexWriter = index
        .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
        .map_err(|e| RepositoryError::storage("failed to open index writer", e))?;

    // One document per (kind, id); a stable insertion order keeps builds reproducible.
    let unique: BTreeMap<(SourceKind, String), SourceDocument> = documents
        .into_iter()
        .map(|d| ((d.source_kind, d.source_id.clone()), d))
        .collect();

    for document in unique.into_values() {
        writer
            .add_document(doc!(
                fields.source_kind => document.source_kind.as_ref(),
                fields.source_id => document.source_id.as_str(),
                fields.title => document.title.as_str(),
                fields.body => document.body.as_str(),
                fields.excerpt => documents::excerpt(&document.body, EXCERPT_CHARS),
                fields.url => document.url.as_str(),
                fields.updated_at => document
                    .updated_at
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
            ))
            .map_err(|e| RepositoryError::storage("failed to add document", e))?;
    }

    writer
        .commit()
        .map_err(|e| RepositoryError::storage("failed to commit index", e))?;
    writer
        .wait_merging_threads()
        .map_err(|e| RepositoryError::storage("failed to finish index merge", e))?;
    drop(index);

    // Swap into place; an existing index of the same generation is replaced.
    let retired = if target.exists() {
        let retired = repository_dir.join(format!(".retired-{}", uuid::Uuid::new_v4()));
        std::fs::rename(target, &retired)?;
        Some(retired)
    } else {
        None
    };
    std::fs::rename(staging.path(), target)?;
    if let Some(retired) = retired {
        remove_dir_quietly(&retired);
    }
    Ok(())
}

fn run_query(dir: &Path, repository: &str, text: &str, limit: usize) -> Result<Vec<IndexedDocument>> {
    let index =
        Index::open_in_dir(dir).map_err(|e| RepositoryError::storage("failed to open index", e))?;
    let fields = IndexFields::resolve(&index.schema())?;
    let reader: IndexReader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()
        .map_err(|e| RepositoryError::storage("failed to open index reader", e))?;
    let searcher = reader.searcher();

    let mut parser = QueryParser::for_index(&index, vec![fields.title, fields.body]);
    parser.set_field_boost(fields.title, 2.0);
    // Stray operators or quotes in user input degrade to plain terms.
    let (query, _errors) = parser.parse_query_lenient(text);

    // Every hit is fetched so the tie-break is applied before truncation.
    let candidate_count = usize::try_from(searcher.num_docs())
        .unwrap_or(usize::MAX)
        .max(1);
    let top_docs = searcher
        .search(&query, &TopDocs::with_limit(candidate_count))
        .map_err(|e| RepositoryError::storage("search failed", e))?;

    let mut hits = Vec::with_capacity(top_docs.len());
    for (score, address) in top_docs {
        let doc: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| RepositoryError::storage("failed to load document", e))?;
        let text_of = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        let kind_text = text_of(fields.source_kind);
        let source_kind = kind_text.parse::<SourceKind>().map_err(|_| {
            RepositoryError::CacheCorrupted(format!("unknown source kind '{}' in index", kind_text))
        })?;
        let updated_at = DateTime::parse_from_rfc3339(&text_of(fields.updated_at))
            .ok()
            .map(|t| t.with_timezone(&Utc));

        hits.push(IndexedDocument {
            repository: repository.to_string(),
            source_kind,
            source_id: text_of(fields.source_id),
            title: text_of(fields.title),
            body_excerpt: text_of(fields.excerpt),
            url: text_of(fields.url),
            updated_at,
            score,
        });
    }

    hits.sort_by(compare_hits);
    hits.truncate(limit);
    Ok(hits)
}

/// Score descending, then newest first, then title, kind and id ascending
fn compare_hits(a: &IndexedDocument, b: &IndexedDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        // `None` sorts before `Some`, so reversing puts undated documents last.
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.source_kind.cmp(&b.source_kind))
        .then_with(|| a.source_id.cmp(&b.source_id))
}

fn remove_dir_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
