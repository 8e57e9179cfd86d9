//! Jikan API v4 access.
//!
//! A paced, retrying request client, a TTL response cache in front of it,
//! and typed endpoints for listings, anime detail, rosters and themes.

pub mod client;
pub mod rate_limiter;
pub mod request;
pub mod types;

pub use client::JikanClient;
pub use rate_limiter::{PacingPolicy, RateLimiter};
pub use request::{RequestClient, RequestSettings};
pub use types::*;
