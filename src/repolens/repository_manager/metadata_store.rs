//! Persistent CacheEntry records
//!
//! Entries live in an embedded `native_db` database (`metadata.db` under the
//! cache root) so a restarted process finds its mirrors again without
//! re-fetching them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use native_db::*;
use native_model::{Model, native_model};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::repolens::errors::{RepositoryError, Result};

/// Record of one materialized repository
///
/// `local_root_path` points at the checkout of the current generation. A
/// refresh writes a whole new generation directory and replaces the record in
/// one transaction, so readers see either the old or the new mirror, never a mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct CacheEntry {
    /// Normalized `owner/name`
    #[primary_key]
    pub identifier: String,
    pub local_root_path: PathBuf,
    /// Activity and metadata snapshot stored next to the checkout
    pub snapshot_path: PathBuf,
    pub last_fetched_at: DateTime<Utc>,
    pub content_commit_reference: String,
    pub ttl_seconds: u64,
    /// Unique id of the on-disk generation this entry points at
    pub generation: String,
}

impl CacheEntry {
    /// Directory holding the checkout and the snapshot of this generation
    pub fn generation_dir(&self) -> Option<&Path> {
        self.local_root_path.parent()
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.last_fetched_at);
        // A clock that went backwards still counts as fresh.
        age.num_seconds() < self.ttl_seconds as i64
    }
}

static MODELS: Lazy<Models> = Lazy::new(|| {
    let mut models = Models::new();
    models
        .define::<CacheEntry>()
        .expect("CacheEntry model definition is valid");
    models
});

pub struct MetadataStore {
    db: Database<'static>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path)
            .map_err(|e| RepositoryError::storage("failed to open metadata store", e))?;
        Ok(Self { db })
    }

    pub fn get(&self, identifier: &str) -> Result<Option<CacheEntry>> {
        let r = self
            .db
            .r_transaction()
            .map_err(|e| RepositoryError::storage("failed to begin read", e))?;
        r.get()
            .primary(identifier.to_string())
            .map_err(|e| RepositoryError::storage("failed to read cache entry", e))
    }

    pub fn upsert(&self, entry: CacheEntry) -> Result<()> {
        let rw = self
            .db
            .rw_transaction()
            .map_err(|e| RepositoryError::storage("failed to begin write", e))?;
        rw.upsert(entry)
            .map_err(|e| RepositoryError::storage("failed to write cache entry", e))?;
        rw.commit()
            .map_err(|e| RepositoryError::storage("failed to commit cache entry", e))
    }

    /// Removes the entry for `identifier`, returning it if it existed
    pub fn remove(&self, identifier: &str) -> Result<Option<CacheEntry>> {
        let Some(existing) = self.get(identifier)? else {
            return Ok(None);
        };
        let rw = self
            .db
            .rw_transaction()
            .map_err(|e| RepositoryError::storage("failed to begin write", e))?;
        let removed = rw
            .remove(existing)
            .map_err(|e| RepositoryError::storage("failed to remove cache entry", e))?;
        rw.commit()
            .map_err(|e| RepositoryError::storage("failed to commit removal", e))?;
        Ok(Some(removed))
    }

    pub fn all(&self) -> Result<Vec<CacheEntry>> {
        let r = self
            .db
            .r_transaction()
            .map_err(|e| RepositoryError::storage("failed to begin read", e))?;
        let scan = r
            .scan()
            .primary::<CacheEntry>()
            .map_err(|e| RepositoryError::storage("failed to scan cache entries", e))?;
        let entries = scan
            .all()
            .map_err(|e| RepositoryError::storage("failed to scan cache entries", e))?;
        entries
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::storage("failed to decode cache entry", e))
    }
}
