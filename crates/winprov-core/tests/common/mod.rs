//! Shared fixtures for provisioning tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use winprov_core::{
    Architecture, Asset, ProvisionConfig, ProvisionError, Release, ReleaseFeed, Result,
    RetryPolicy,
};

/// Call counters shared between a test and the feed it hands to a provisioner
#[derive(Debug, Default, Clone)]
pub struct FeedCounters {
    pub release_calls: Arc<AtomicU32>,
    pub download_calls: Arc<AtomicU32>,
}

impl FeedCounters {
    pub fn releases(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> u32 {
        self.download_calls.load(Ordering::SeqCst)
    }
}

/// In-memory release feed that can fail a fixed number of times first
pub struct MockFeed {
    release: Release,
    payloads: HashMap<String, Vec<u8>>,
    release_failures: AtomicU32,
    download_failures: AtomicU32,
    counters: FeedCounters,
}

impl MockFeed {
    pub fn new(tag: &str, assets: &[(&str, Vec<u8>)]) -> Self {
        let release = Release {
            tag_name: tag.to_string(),
            name: Some(tag.to_string()),
            assets: assets
                .iter()
                .map(|(name, bytes)| Asset {
                    name: name.to_string(),
                    browser_download_url: format!("https://downloads.invalid/{name}"),
                    size: bytes.len() as u64,
                })
                .collect(),
        };

        Self {
            release,
            payloads: assets
                .iter()
                .map(|(name, bytes)| (name.to_string(), bytes.clone()))
                .collect(),
            release_failures: AtomicU32::new(0),
            download_failures: AtomicU32::new(0),
            counters: FeedCounters::default(),
        }
    }

    pub fn failing_releases(self, count: u32) -> Self {
        self.release_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_downloads(self, count: u32) -> Self {
        self.download_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn counters(&self) -> FeedCounters {
        self.counters.clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ReleaseFeed for MockFeed {
    async fn latest_release(&self, repo: &str) -> Result<Release> {
        self.counters.release_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.release_failures) {
            return Err(ProvisionError::Http {
                url: format!("https://api.invalid/repos/{repo}/releases/latest"),
                status: 503,
            });
        }
        Ok(self.release.clone())
    }

    async fn download(&self, asset: &Asset) -> Result<Vec<u8>> {
        self.counters.download_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.download_failures) {
            return Err(ProvisionError::Http {
                url: asset.browser_download_url.clone(),
                status: 502,
            });
        }
        self.payloads
            .get(&asset.name)
            .cloned()
            .ok_or_else(|| ProvisionError::Http {
                url: asset.browser_download_url.clone(),
                status: 404,
            })
    }
}

/// Configuration rooted in `root` with fast retries
pub fn test_config(root: &Path) -> ProvisionConfig {
    ProvisionConfig {
        install_root: root.join("machine"),
        user_root: root.join("user"),
        cache_dir: root.join("cache"),
        architecture: Some(Architecture::X86_64),
        retry: RetryPolicy::new(3, Duration::from_millis(1)).unwrap(),
        ..Default::default()
    }
}

/// Build a zip archive in memory
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Initialize tracing for tests
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}
