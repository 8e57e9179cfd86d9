//! Catalog builder library for acquiring the anime catalog from the Jikan API.
//!
//! This library discovers candidate anime, enriches them with characters and
//! themes, and publishes the result as a resumable, atomically written
//! catalog.

pub mod api;
pub mod cache;
pub mod checkpoint;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod writer;

pub use api::{JikanClient, RateLimiter, RequestClient};
pub use cache::CacheLayer;
pub use checkpoint::{Checkpoint, CheckpointStore, RunState};
pub use discovery::Discovery;
pub use enrichment::Enricher;
pub use error::{CrawlError, CrawlResult};
pub use lock::RunLock;
pub use orchestrator::{Orchestrator, RefreshMode, RunStats};
pub use writer::CatalogWriter;
