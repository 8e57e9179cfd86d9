//! TTL-bounded cache of raw API responses.
//!
//! Responses are keyed by a SHA-256 of endpoint and sorted query parameters
//! and stored one JSON file per key. A record is served only while it is
//! younger than the TTL and no force-refresh was requested.

use crate::writer::write_atomic;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One cached upstream response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub fetched_at: DateTime<Utc>,
    pub response: Value,
}

/// Cache for API responses
pub struct CacheLayer {
    /// Root cache directory
    cache_dir: PathBuf,
    /// Whether caching is enabled
    enabled: bool,
    /// Maximum age of a served record
    ttl: Duration,
    /// Ignore existing records for this run
    force_refresh: bool,
}

impl CacheLayer {
    /// Create a new cache layer
    pub fn new(cache_dir: impl AsRef<Path>, enabled: bool, ttl: Duration) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        if enabled {
            std::fs::create_dir_all(&cache_dir)
                .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
            info!(cache_dir = %cache_dir.display(), ttl_hours = ttl.num_hours(), "Cache initialized");
        }

        Ok(Self {
            cache_dir,
            enabled,
            ttl,
            force_refresh: false,
        })
    }

    /// Bypass cached records regardless of their age. Fresh responses are still stored.
    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Deterministic key for an endpoint and its parameters
    pub fn cache_key(endpoint: &str, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<_> = params.iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        for (name, value) in sorted {
            hasher.update(b"\x1f");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Get a cached response if one exists and is still fresh
    pub fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Option<Value> {
        if !self.enabled || self.force_refresh {
            return None;
        }

        let key = Self::cache_key(endpoint, params);
        let path = self.cache_path(&key);
        if !path.exists() {
            debug!(endpoint = endpoint, "Cache miss");
            return None;
        }

        let record = match read_record(&path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache record");
                return None;
            }
        };

        if Utc::now() - record.fetched_at >= self.ttl {
            debug!(endpoint = endpoint, fetched_at = %record.fetched_at, "Cache record expired");
            return None;
        }

        debug!(endpoint = endpoint, "Cache hit");
        Some(record.response)
    }

    /// Store a successful response
    pub fn put(&self, endpoint: &str, params: &[(&str, String)], response: &Value) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let record = CacheRecord {
            key: Self::cache_key(endpoint, params),
            endpoint: endpoint.to_string(),
            params: params
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
            fetched_at: Utc::now(),
            response: response.clone(),
        };
        self.store(&record)
    }

    fn store(&self, record: &CacheRecord) -> Result<()> {
        let path = self.cache_path(&record.key);
        let content = serde_json::to_vec(record).context("Failed to serialize cache record")?;

        write_atomic(&path, &content)
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;

        debug!(endpoint = %record.endpoint, path = %path.display(), "Cache stored");
        Ok(())
    }

    /// Get the cache file path for a given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Clear all cache
    pub fn clear(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)
                .with_context(|| format!("Failed to remove cache directory: {}", self.cache_dir.display()))?;
            std::fs::create_dir_all(&self.cache_dir)
                .with_context(|| format!("Failed to recreate cache directory: {}", self.cache_dir.display()))?;
            info!("Cache cleared");
        }

        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        if !self.enabled || !self.cache_dir.exists() {
            return Ok(CacheStats {
                total_files: 0,
                total_size_bytes: 0,
            });
        }

        let mut total_files = 0;
        let mut total_size_bytes = 0;

        for entry in std::fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                total_files += 1;
                total_size_bytes += entry.metadata()?.len();
            }
        }

        Ok(CacheStats {
            total_files,
            total_size_bytes,
        })
    }
}

fn read_record(path: &Path) -> Result<CacheRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse cache file: {}", path.display()))
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
}
