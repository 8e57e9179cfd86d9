//! Configuration management for the catalog builder.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use crate::freshness::{CATALOG_STALE_AFTER_DAYS, RESPONSE_CACHE_TTL_HOURS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    #[serde(default)]
    pub data: DataConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Jikan API settings
    #[serde(default)]
    pub jikan: JikanConfig,

    /// Discovery filters
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Enrichment settings
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Published catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Jikan API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JikanConfig {
    /// Jikan API base URL
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,

    /// Cache settings
    pub cache: CacheConfig,
}

/// Rate limiting and backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum interval between the end of one request and the start of the next
    pub min_interval_ms: u64,

    /// Maximum requests per minute
    pub requests_per_minute: u32,

    /// Interval growth per consecutive 429 (interval * (1 + factor * count))
    pub throttle_interval_factor: f64,

    /// Base sleep after a 429
    pub backoff_base_ms: u64,

    /// Backoff growth per consecutive 429 (base * (1 + factor * count))
    pub backoff_factor: f64,

    /// Upper bound for a single backoff sleep
    pub max_backoff_ms: u64,

    /// Maximum retries of one call before giving up
    pub max_retries: u32,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching
    pub enabled: bool,

    /// Cache directory (relative to data directory)
    pub cache_dir: String,

    /// Age after which a cached response is refetched
    pub ttl_hours: i64,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Minimum score for the by-score pass
    pub min_score: f64,

    /// Maximum popularity rank for the by-popularity pass
    pub max_popularity: u32,

    /// Optional page cap per pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,

    /// Also walk the current and next season plus airing anime in incremental runs
    pub include_seasonal: bool,
}

/// Enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Number of anime enriched between two flushes
    pub batch_size: usize,

    /// Roster role kept in the catalog
    pub character_role: String,

    /// Fetch each character's detail record (falls back to the roster entry)
    pub fetch_character_details: bool,

    /// Also catalog ending themes
    pub include_endings: bool,
}

/// Published catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog age after which a refresh is due
    pub stale_after_days: i64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root_dir: "data".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: true,
            json_format: false,
        }
    }
}

impl Default for JikanConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.jikan.moe/v4".to_string(),
            timeout_seconds: 30,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            requests_per_minute: 60,
            throttle_interval_factor: 0.5,
            backoff_base_ms: 4000,
            backoff_factor: 1.0,
            max_backoff_ms: 60_000,
            max_retries: 3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: "cache".to_string(),
            ttl_hours: RESPONSE_CACHE_TTL_HOURS,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_score: 6.0,
            max_popularity: 1000,
            max_pages: None,
            include_seasonal: true,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            character_role: "Main".to_string(),
            fetch_character_details: true,
            include_endings: false,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            stale_after_days: CATALOG_STALE_AFTER_DAYS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Get the absolute path for the cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.jikan.cache.cache_dir)
    }

    /// Parse the configured log level, falling back to INFO
    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .default_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }

    fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}
