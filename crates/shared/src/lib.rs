//! Shared library for the anime catalog builder.
//!
//! This crate provides functionality used by the pipeline binary and by the
//! game front-end that serves the catalog:
//! - Configuration management
//! - Catalog data models
//! - File path utilities
//! - Logging infrastructure
//! - Freshness checks
//! - Read-only catalog access

pub mod catalog;
pub mod config;
pub mod freshness;
pub mod logging;
pub mod models;
pub mod paths;

// Re-export commonly used types
pub use catalog::Catalog;
pub use config::Config;
pub use logging::LogConfig;
pub use models::*;
pub use paths::DataPaths;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
