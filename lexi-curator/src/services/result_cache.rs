//! Search+score result cache
//!
//! Keyed by a SHA-256 of the trimmed, lowercased query. Entries older than
//! the caller's max age are misses; unreadable entries are misses too.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lexi_common::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::models::ScoredCandidate;

/// A cached result list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    pub cached_at: DateTime<Utc>,
    pub results: Vec<ScoredCandidate>,
}

/// Pluggable get/set/clear cache
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Cached results no older than `max_age_hours`
    async fn get(&self, query: &str, max_age_hours: u64) -> Option<Vec<ScoredCandidate>>;

    /// Store (or overwrite) the results for `query`
    async fn set(&self, query: &str, results: &[ScoredCandidate]) -> Result<()>;

    /// Remove every entry, returning the number removed
    async fn clear(&self) -> Result<usize>;
}

/// Cache key derivation
pub fn cache_key(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One JSON file per query under a cache directory
pub struct FileResultCache {
    dir: PathBuf,
}

impl FileResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, query: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(query)))
    }
}

#[async_trait]
impl ResultCache for FileResultCache {
    async fn get(&self, query: &str, max_age_hours: u64) -> Option<Vec<ScoredCandidate>> {
        let path = self.entry_path(query);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(_) => return None,
        };

        let entry: CacheEntry = match serde_json::from_slice(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring corrupt cache entry: {}", e);
                return None;
            }
        };

        let max_age = ChronoDuration::hours(max_age_hours.min(i64::MAX as u64 / 3600) as i64);
        if Utc::now() - entry.cached_at > max_age {
            tracing::debug!(query, "Cache entry expired");
            return None;
        }

        tracing::debug!(query, results = entry.results.len(), "Cache hit");
        Some(entry.results)
    }

    async fn set(&self, query: &str, results: &[ScoredCandidate]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let entry = CacheEntry {
            query: query.to_string(),
            cached_at: Utc::now(),
            results: results.to_vec(),
        };
        let path = self.entry_path(query);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(&entry)?).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        tracing::info!(removed, "Cleared result cache");
        Ok(removed)
    }
}
