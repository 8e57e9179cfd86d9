//! Error taxonomy for the acquisition pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::checkpoint::RunState;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// A transport-level failure for one attempt. Retried by the request client.
    #[error("transient network error on {endpoint}: {source}")]
    TransientNetwork {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("rate limited on {endpoint} after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("upstream unavailable for {endpoint}: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// Part of an anime could not be fetched; it must not be marked processed
    #[error("anime {mal_id} incomplete: {what} unavailable")]
    EntityIncomplete { mal_id: u32, what: &'static str },

    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("another run holds the lock on {}", path.display())]
    Locked { path: PathBuf },

    #[error("invalid checkpoint transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl CrawlError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrawlError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Errors that end the current batch instead of skipping one entity.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::RateLimited { .. } | CrawlError::UpstreamUnavailable { .. }
        )
    }
}

pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
