//! File path utilities for organizing data files.
//!
//! This module provides a centralized way to manage file paths for the
//! published catalog, the resume checkpoint, the response cache and logs.

use std::path::{Path, PathBuf};

/// File path manager for data files
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Create a new DataPaths with the given root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Published catalog ==========

    /// Get the catalog directory
    pub fn catalog_dir(&self) -> PathBuf {
        self.root.join("catalog")
    }

    /// Get the published characters file
    pub fn characters_file(&self) -> PathBuf {
        self.catalog_dir().join("characters.json")
    }

    /// Get the published openings file
    pub fn openings_file(&self) -> PathBuf {
        self.catalog_dir().join("openings.json")
    }

    /// Get the freshness marker written when a refresh completes
    pub fn last_update_file(&self) -> PathBuf {
        self.catalog_dir().join("last_update.txt")
    }

    /// Get the set of anime ids the published catalog covers, including
    /// anime that yielded no records
    pub fn processed_file(&self) -> PathBuf {
        self.catalog_dir().join("processed_anime.json")
    }

    // ========== Resume state ==========

    /// Get the resume checkpoint path (never read by the serving side)
    pub fn checkpoint_file(&self) -> PathBuf {
        self.catalog_dir().join("fetch_progress.json")
    }

    /// Get the lock file guarding a pipeline run
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("catalog.lock")
    }

    // ========== Cache ==========

    /// Get the default response cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    // ========== Logs ==========

    /// Get logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    // ========== Utility Methods ==========

    /// Create all necessary directories
    pub fn create_dirs(&self) -> std::io::Result<()> {
        let dirs = vec![self.catalog_dir(), self.cache_dir(), self.logs_dir()];

        for dir in dirs {
            std::fs::create_dir_all(&dir)?;
        }

        Ok(())
    }
}
