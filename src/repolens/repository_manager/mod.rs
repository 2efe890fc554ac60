pub mod metadata_store;
pub mod providers;
mod repository_identifier;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

pub use metadata_store::CacheEntry;
pub use repository_identifier::RepositoryIdentifier;

use metadata_store::MetadataStore;
use providers::{RemoteSource, RepositorySnapshot};

use crate::repolens::config::RepositoryManagerConfig;
use crate::repolens::errors::{RepositoryError, Result};
use crate::repolens::search_index::SearchIndex;

const CHECKOUT_DIR: &str = "checkout";
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Source of the current time, injectable so freshness can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Result of [`RepositoryManager::ensure_fresh`]
#[derive(Debug, Clone, PartialEq)]
pub struct Freshness {
    pub entry: CacheEntry,
    /// Set when a refresh failed and the previous mirror is served instead
    pub warning: Option<String>,
    /// Whether this call fetched from the remote
    pub fetched: bool,
}

impl Freshness {
    fn cached(entry: CacheEntry) -> Self {
        Self {
            entry,
            warning: None,
            fetched: false,
        }
    }

    fn fetched(entry: CacheEntry) -> Self {
        Self {
            entry,
            warning: None,
            fetched: true,
        }
    }
}

/// Local mirror cache
///
/// Keeps one on-disk materialization per repository under
/// `<cache_root>/repos/<owner__name>/<generation>/`, each generation holding
/// the shallow checkout and the activity snapshot. Entries younger than their
/// TTL are served without touching the network. Refreshes are serialized per
/// repository and swap in a complete new generation, so a failed refresh never
/// damages the mirror that was there before.
///
/// Cloning is cheap; clones share the same state. Construct one per process
/// and hand it to whoever needs it.
#[derive(Clone)]
pub struct RepositoryManager {
    inner: Arc<ManagerState>,
}

struct ManagerState {
    config: RepositoryManagerConfig,
    remote: Arc<dyn RemoteSource>,
    clock: Arc<dyn Clock>,
    store: MetadataStore,
    search_index: SearchIndex,
    entries: RwLock<HashMap<String, CacheEntry>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl RepositoryManager {
    /// Creates a manager rooted at `config.cache_root`
    ///
    /// Creates the cache layout if needed and discards staging leftovers from
    /// an interrupted previous run.
    pub fn new(config: RepositoryManagerConfig, remote: Arc<dyn RemoteSource>) -> Result<Self> {
        Self::with_clock(config, remote, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: RepositoryManagerConfig,
        remote: Arc<dyn RemoteSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.cache_root.exists() && !config.cache_root.is_dir() {
            return Err(RepositoryError::Storage(format!(
                "cache root '{}' is not a directory",
                config.cache_root.display()
            )));
        }

        let staging = config.staging_dir();
        if staging.exists() {
            if let Err(e) = std::fs::remove_dir_all(&staging) {
                tracing::warn!("Failed to clear staging directory {}: {}", staging.display(), e);
            }
        }
        for dir in [config.mirrors_dir(), config.index_dir(), staging] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                RepositoryError::storage(&format!("failed to create {}", dir.display()), e)
            })?;
        }

        let store = MetadataStore::open(&config.metadata_db_path())?;
        let search_index = SearchIndex::new(config.index_dir());

        tracing::info!(
            "Repository cache at {} (ttl {}s)",
            config.cache_root.display(),
            config.ttl_seconds
        );

        Ok(Self {
            inner: Arc::new(ManagerState {
                config,
                remote,
                clock,
                store,
                search_index,
                entries: RwLock::new(HashMap::new()),
                fetch_locks: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &RepositoryManagerConfig {
        &self.inner.config
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.inner.search_index
    }

    /// Returns an entry whose mirror is at most `ttl_seconds` old
    ///
    /// A fresh entry with an intact mirror is returned without any network
    /// call or lock. Otherwise the caller takes the per-repository fetch lock,
    /// re-checks (another caller may have refreshed meanwhile), and fetches.
    ///
    /// When a refresh fails with `RemoteUnavailable` and a valid previous
    /// mirror exists, that mirror is returned with a warning. A missing or
    /// damaged mirror forces a re-fetch.
    pub async fn ensure_fresh(&self, identifier: &RepositoryIdentifier) -> Result<Freshness> {
        if let Some(entry) = self.lookup(identifier)? {
            if entry.is_fresh_at(self.inner.clock.now()) && check_mirror(&entry).is_ok() {
                tracing::debug!("Cache hit for {}", identifier);
                return Ok(Freshness::cached(entry));
            }
        }
        self.refresh_exclusive(identifier, None).await
    }

    /// Re-fetches a repository whose mirror turned out to be unreadable
    ///
    /// If another caller already replaced `corrupted` with a newer generation,
    /// that generation is returned instead.
    pub async fn recover_corrupted(
        &self,
        identifier: &RepositoryIdentifier,
        corrupted: &CacheEntry,
    ) -> Result<Freshness> {
        self.refresh_exclusive(identifier, Some(corrupted.generation.clone()))
            .await
    }

    /// Reads the activity snapshot stored with an entry's generation
    pub fn load_snapshot(&self, entry: &CacheEntry) -> Result<RepositorySnapshot> {
        let raw = std::fs::read(&entry.snapshot_path).map_err(|e| {
            RepositoryError::CacheCorrupted(format!(
                "snapshot {} unreadable: {}",
                entry.snapshot_path.display(),
                e
            ))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            RepositoryError::CacheCorrupted(format!(
                "snapshot {} is invalid: {}",
                entry.snapshot_path.display(),
                e
            ))
        })
    }

    /// Current entry for `identifier`, fresh or not, without fetching
    pub fn entry(&self, identifier: &RepositoryIdentifier) -> Result<Option<CacheEntry>> {
        self.lookup(identifier)
    }

    /// Removes the entry, its mirror and its search index unconditionally
    ///
    /// Waits for an in-flight refresh of the same repository to finish first.
    /// Returns whether anything was cached.
    pub async fn clear(&self, identifier: &RepositoryIdentifier) -> Result<bool> {
        let lock = self.fetch_lock(identifier);
        let guard = lock.lock().await;
        let index_guard = self.inner.search_index.lock_repository(identifier).await;

        let key = identifier.full_name();
        let cached = self.write_entries().remove(&key).is_some();
        let stored = self.inner.store.remove(&key)?.is_some();

        let mirror_dir = self.inner.config.mirrors_dir().join(identifier.cache_key());
        let had_mirror = mirror_dir.exists();
        if had_mirror {
            std::fs::remove_dir_all(&mirror_dir).map_err(|e| {
                RepositoryError::storage(&format!("failed to remove {}", mirror_dir.display()), e)
            })?;
        }
        self.inner.search_index.remove_repository(identifier);

        drop(index_guard);
        drop(guard);
        self.release_fetch_lock(identifier, lock);
        self.inner.search_index.release_lock(identifier);

        tracing::info!("Cleared cache for {}", identifier);
        Ok(cached || stored || had_mirror)
    }

    /// Clears every cached repository, returning the identifiers that were removed
    pub async fn clear_all(&self) -> Result<Vec<RepositoryIdentifier>> {
        let mut names: Vec<String> = self
            .inner
            .store
            .all()?
            .into_iter()
            .map(|entry| entry.identifier)
            .collect();
        names.extend(self.read_entries().keys().cloned());
        names.sort();
        names.dedup();

        let mut cleared = Vec::with_capacity(names.len());
        for name in names {
            match RepositoryIdentifier::parse(&name) {
                Ok(identifier) => {
                    self.clear(&identifier).await?;
                    cleared.push(identifier);
                }
                Err(e) => {
                    tracing::warn!("Dropping unparsable cache entry '{}': {}", name, e);
                    self.write_entries().remove(&name);
                    self.inner.store.remove(&name)?;
                }
            }
        }
        Ok(cleared)
    }

    fn lookup(&self, identifier: &RepositoryIdentifier) -> Result<Option<CacheEntry>> {
        let key = identifier.full_name();
        if let Some(entry) = self.read_entries().get(&key) {
            return Ok(Some(entry.clone()));
        }

        // Lazily pick up entries persisted by an earlier process.
        let stored = self.inner.store.get(&key)?;
        if let Some(entry) = &stored {
            self.write_entries()
                .entry(key)
                .or_insert_with(|| entry.clone());
        }
        Ok(stored)
    }

    fn fetch_lock(&self, identifier: &RepositoryIdentifier) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .fetch_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(identifier.full_name()).or_default())
    }

    /// Forgets the fetch lock of `identifier` unless another caller still holds it
    fn release_fetch_lock(
        &self,
        identifier: &RepositoryIdentifier,
        lock: Arc<tokio::sync::Mutex<()>>,
    ) {
        let mut locks = self
            .inner
            .fetch_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        let key = identifier.full_name();
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_fetch_locks(&self) -> usize {
        self.inner
            .fetch_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the refresh on its own task while holding the fetch lock
    ///
    /// A caller that stops waiting does not cancel the fetch: it runs to
    /// completion (or its timeout) and other waiters still get its result.
    async fn refresh_exclusive(
        &self,
        identifier: &RepositoryIdentifier,
        corrupted_generation: Option<String>,
    ) -> Result<Freshness> {
        let guard = self.fetch_lock(identifier).lock_owned().await;
        let manager = self.clone();
        let id = identifier.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            manager.refresh_locked(&id, corrupted_generation).await
        });

        task.await.map_err(|e| {
            RepositoryError::Storage(format!("refresh of {} did not complete: {}", identifier, e))
        })?
    }

    async fn refresh_locked(
        &self,
        identifier: &RepositoryIdentifier,
        corrupted_generation: Option<String>,
    ) -> Result<Freshness> {
        let prior = match self.lookup(identifier)? {
            Some(entry) => {
                let known_bad = corrupted_generation.as_deref() == Some(entry.generation.as_str());
                match check_mirror(&entry) {
                    Ok(()) if !known_bad && entry.is_fresh_at(self.inner.clock.now()) => {
                        // Refreshed by whoever held the lock before us.
                        return Ok(Freshness::cached(entry));
                    }
                    Ok(()) if !known_bad => Some(entry),
                    check => {
                        let reason = match check {
                            Err(e) => e.to_string(),
                            Ok(()) => "reported unreadable".to_string(),
                        };
                        tracing::warn!(
                            "Mirror of {} is corrupted ({}), forcing re-fetch",
                            identifier,
                            reason
                        );
                        self.discard_generation(identifier, &entry).await;
                        None
                    }
                }
            }
            None => None,
        };

        match (self.fetch_generation(identifier).await, prior) {
            (Ok(entry), prior) => self
                .commit_generation(identifier, entry, prior.as_ref())
                .await
                .map(Freshness::fetched),
            (Err(RepositoryError::RemoteUnavailable(reason)), Some(prior)) => {
                tracing::warn!(
                    "Refresh of {} failed, serving mirror from {}: {}",
                    identifier,
                    prior.last_fetched_at,
                    reason
                );
                let warning = format!(
                    "Serving cached copy fetched at {} because the refresh failed: {}",
                    prior.last_fetched_at.to_rfc3339(),
                    reason
                );
                Ok(Freshness {
                    entry: prior,
                    warning: Some(warning),
                    fetched: false,
                })
            }
            (Err(e), _) => Err(e),
        }
    }

    /// Fetches metadata, content and activity into a new generation directory
    ///
    /// Everything is written to a staging directory first; only a complete
    /// generation is moved under `repos/`.
    async fn fetch_generation(&self, identifier: &RepositoryIdentifier) -> Result<CacheEntry> {
        let config = &self.inner.config;
        let remote = &self.inner.remote;

        tracing::info!("Fetching {}", identifier);
        let metadata = remote.fetch_metadata(identifier).await?;

        let staging = tempfile::Builder::new()
            .prefix(&format!("{}-", identifier.cache_key()))
            .tempdir_in(config.staging_dir())
            .map_err(|e| RepositoryError::storage("failed to create staging directory", e))?;

        let commit = remote
            .fetch_content(identifier, &metadata, &staging.path().join(CHECKOUT_DIR))
            .await?;
        let activity = remote
            .fetch_activity(identifier, config.activity_limit)
            .await?;

        let snapshot = RepositorySnapshot { metadata, activity };
        let snapshot_json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| RepositoryError::storage("failed to encode snapshot", e))?;
        std::fs::write(staging.path().join(SNAPSHOT_FILE), snapshot_json)?;

        let generation = uuid::Uuid::new_v4().simple().to_string();
        let repository_dir = config.mirrors_dir().join(identifier.cache_key());
        std::fs::create_dir_all(&repository_dir)?;
        let generation_dir = repository_dir.join(&generation);
        std::fs::rename(staging.path(), &generation_dir).map_err(|e| {
            let context = format!("failed to move {} into place", generation_dir.display());
            RepositoryError::storage(&context, e)
        })?;

        Ok(CacheEntry {
            identifier: identifier.full_name(),
            local_root_path: generation_dir.join(CHECKOUT_DIR),
            snapshot_path: generation_dir.join(SNAPSHOT_FILE),
            last_fetched_at: self.inner.clock.now(),
            content_commit_reference: commit,
            ttl_seconds: config.ttl_seconds,
            generation,
        })
    }

    /// Points the entry at a freshly fetched generation and drops the previous one
    async fn commit_generation(
        &self,
        identifier: &RepositoryIdentifier,
        entry: CacheEntry,
        prior: Option<&CacheEntry>,
    ) -> Result<CacheEntry> {
        if let Err(e) = self.inner.store.upsert(entry.clone()) {
            if let Some(dir) = entry.generation_dir() {
                remove_dir_quietly(dir);
            }
            return Err(e);
        }
        self.write_entries()
            .insert(identifier.full_name(), entry.clone());

        if let Some(prior) = prior {
            if prior.generation != entry.generation {
                self.remove_generation_files(identifier, prior).await;
            }
        }

        tracing::info!(
            "Mirrored {} at {} (generation {})",
            identifier,
            entry.content_commit_reference,
            entry.generation
        );
        Ok(entry)
    }

    async fn discard_generation(&self, identifier: &RepositoryIdentifier, entry: &CacheEntry) {
        self.write_entries().remove(&identifier.full_name());
        if let Err(e) = self.inner.store.remove(&identifier.full_name()) {
            tracing::warn!("Failed to remove stored entry for {}: {}", identifier, e);
        }
        self.remove_generation_files(identifier, entry).await;
    }

    /// Deletes a generation's checkout and index while no build can read them
    async fn remove_generation_files(
        &self,
        identifier: &RepositoryIdentifier,
        entry: &CacheEntry,
    ) {
        let _index_guard = self.inner.search_index.lock_repository(identifier).await;
        if let Some(dir) = entry.generation_dir() {
            remove_dir_quietly(dir);
        }
        self.inner
            .search_index
            .remove_generation(identifier, &entry.generation);
    }
}

/// Verifies an entry's mirror is still on disk
///
/// The mirror directory can be altered behind our back, so this runs on every access.
fn check_mirror(entry: &CacheEntry) -> Result<()> {
    if !entry.local_root_path.is_dir() {
        return Err(RepositoryError::CacheCorrupted(format!(
            "mirror directory {} is missing",
            entry.local_root_path.display()
        )));
    }
    if !entry.snapshot_path.is_file() {
        return Err(RepositoryError::CacheCorrupted(format!(
            "snapshot {} is missing",
            entry.snapshot_path.display()
        )));
    }
    Ok(())
}

fn remove_dir_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
