//! Shared fixtures: a scriptable in-memory remote and a manually advanced clock

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use repolens_mcp::repolens::RepositoryManager;
use repolens_mcp::repolens::config::RepositoryManagerConfig;
use repolens_mcp::repolens::errors::{RepositoryError, Result};
use repolens_mcp::repolens::repository_manager::providers::{
    ActivityItem, ContributorRecord, RemoteSource, RepositoryActivity, RepositoryMetadata,
};
use repolens_mcp::repolens::repository_manager::{Clock, RepositoryIdentifier};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance_seconds(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Remote that materializes a fixed file set and counts every call
pub struct FakeRemote {
    pub files: Mutex<Vec<(String, Vec<u8>)>>,
    pub activity: Mutex<RepositoryActivity>,
    pub failure: Mutex<Option<RepositoryError>>,
    pub activity_failure: Mutex<Option<RepositoryError>>,
    pub delay: Mutex<Option<Duration>>,
    pub metadata_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
    pub activity_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(vec![
                (
                    "README.md".to_string(),
                    b"# Demo\n\nDemo explains how to configure the widget runtime.\n".to_vec(),
                ),
                ("src/main.rs".to_string(), b"fn main() {}\n".to_vec()),
                ("src/lib.rs".to_string(), b"pub mod widget;\n".to_vec()),
                (
                    "docs/guide.md".to_string(),
                    b"# Guide\n\nInstall the widget with cargo.\n".to_vec(),
                ),
            ]),
            activity: Mutex::new(sample_activity()),
            failure: Mutex::new(None),
            activity_failure: Mutex::new(None),
            delay: Mutex::new(None),
            metadata_calls: AtomicUsize::new(0),
            content_calls: AtomicUsize::new(0),
            activity_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(&self, error: Option<RepositoryError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn fail_activity_with(&self, error: Option<RepositoryError>) {
        *self.activity_failure.lock().unwrap() = error;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .push((path.to_string(), content.to_vec()));
    }

    pub fn fetches(&self) -> usize {
        self.content_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_metadata(&self, identifier: &RepositoryIdentifier) -> Result<RepositoryMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(RepositoryMetadata {
            owner: identifier.owner().to_string(),
            name: identifier.name().to_string(),
            full_name: identifier.full_name(),
            description: Some("A demo repository".to_string()),
            stars: 42,
            forks: 7,
            language: Some("Rust".to_string()),
            default_branch: "main".to_string(),
            clone_url: identifier.clone_url(),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            pushed_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()),
        })
    }

    async fn fetch_content(
        &self,
        _identifier: &RepositoryIdentifier,
        _metadata: &RepositoryMetadata,
        destination: &Path,
    ) -> Result<String> {
        let call = self.content_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let files = self.files.lock().unwrap().clone();
        for (relative, content) in files {
            let path = destination.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        std::fs::create_dir_all(destination)?;
        Ok(format!("commit-{}", call))
    }

    async fn fetch_activity(
        &self,
        _identifier: &RepositoryIdentifier,
        _limit: usize,
    ) -> Result<RepositoryActivity> {
        self.activity_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.activity_failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.activity.lock().unwrap().clone())
    }
}

pub fn sample_activity() -> RepositoryActivity {
    let item = |number: u64, title: &str, body: &str, day: u32, is_pull_request: bool| {
        ActivityItem {
            number,
            title: title.to_string(),
            body: Some(body.to_string()),
            state: "open".to_string(),
            author: "octocat".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap(),
            url: format!(
                "https://github.com/octo/demo/{}/{}",
                if is_pull_request { "pull" } else { "issues" },
                number
            ),
            is_pull_request,
        }
    };

    RepositoryActivity {
        issues: vec![
            item(12, "Widget crashes on startup", "The runtime panics when configured twice.", 10, false),
            item(11, "Document the configuration file", "Configuration keys are undocumented.", 5, false),
        ],
        pull_requests: vec![item(
            13,
            "Fix widget startup crash",
            "Guards the runtime against double configuration.",
            12,
            true,
        )],
        contributors: vec![
            ContributorRecord {
                login: "alice".to_string(),
                contribution_count: 120,
            },
            ContributorRecord {
                login: "bob".to_string(),
                contribution_count: 30,
            },
        ],
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub remote: Arc<FakeRemote>,
    pub clock: Arc<ManualClock>,
    pub manager: RepositoryManager,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let remote = Arc::new(FakeRemote::new());
    let clock = Arc::new(ManualClock::new());
    let manager = manager_at(dir.path(), remote.clone(), clock.clone());
    Harness {
        dir,
        remote,
        clock,
        manager,
    }
}

pub fn manager_at(
    cache_root: &Path,
    remote: Arc<FakeRemote>,
    clock: Arc<ManualClock>,
) -> RepositoryManager {
    let config = RepositoryManagerConfig::new(cache_root.to_path_buf());
    RepositoryManager::with_clock(config, remote, clock).expect("Failed to create manager")
}

pub fn demo_id() -> RepositoryIdentifier {
    RepositoryIdentifier::parse("octo/demo").expect("valid identifier")
}
