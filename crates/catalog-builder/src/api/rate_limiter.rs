//! Rate limiter with adaptive pacing and throttle backoff.
//!
//! Enforces a minimum interval after each completed request plus a
//! per-minute window. Every HTTP 429 raises a consecutive-throttle counter
//! that both stretches the pacing interval and lengthens the backoff sleep;
//! every success lowers it again by one.

use shared::config::RateLimitConfig;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::warn;

/// Pacing and backoff parameters
#[derive(Debug, Clone)]
pub struct PacingPolicy {
    pub min_interval: Duration,
    pub max_per_minute: u32,
    pub throttle_interval_factor: f64,
    pub backoff_base: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl From<&RateLimitConfig> for PacingPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.min_interval_ms),
            max_per_minute: config.requests_per_minute,
            throttle_interval_factor: non_negative("throttle_interval_factor", config.throttle_interval_factor),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_factor: non_negative("backoff_factor", config.backoff_factor),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Growth factors below zero (or NaN) would shrink delays; treat them as zero
fn non_negative(name: &str, factor: f64) -> f64 {
    if factor >= 0.0 {
        factor
    } else {
        warn!(setting = name, value = factor, "Negative rate limit factor, using 0");
        0.0
    }
}

/// `base * (1 + factor * count)`, saturating instead of panicking
fn scaled(base: Duration, factor: f64, count: u32) -> Duration {
    let multiplier = (1.0 + factor * count as f64).max(1.0);
    Duration::try_from_secs_f64(base.as_secs_f64() * multiplier).unwrap_or(Duration::MAX)
}

impl PacingPolicy {
    /// Sleep after the `count`-th consecutive failure, capped at `max_backoff`
    pub fn backoff_for(&self, count: u32) -> Duration {
        scaled(self.backoff_base, self.backoff_factor, count).min(self.max_backoff)
    }

    /// Pacing interval while `count` throttles are outstanding
    pub fn interval_for(&self, count: u32) -> Duration {
        scaled(self.min_interval, self.throttle_interval_factor, count)
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    policy: PacingPolicy,
    /// When the last request finished
    last_completed: Option<Instant>,
    /// Request start timestamps in the last minute
    recent_requests: Vec<Instant>,
    /// Consecutive 429 responses, decays by one per success
    consecutive_throttles: u32,
}

impl RateLimiter {
    pub fn new(policy: PacingPolicy) -> Self {
        let capacity = policy.max_per_minute as usize;
        Self {
            policy,
            last_completed: None,
            recent_requests: Vec::with_capacity(capacity),
            consecutive_throttles: 0,
        }
    }

    /// Wait until a request can be made, respecting both rate limits
    pub async fn acquire(&mut self) {
        let now = Instant::now();

        // Clean up requests older than 1 minute
        self.recent_requests
            .retain(|&timestamp| now.duration_since(timestamp) < Duration::from_secs(60));

        // Check per-minute limit
        if self.policy.max_per_minute > 0
            && self.recent_requests.len() >= self.policy.max_per_minute as usize
        {
            // Wait until the oldest request is more than 1 minute old
            if let Some(&oldest) = self.recent_requests.first() {
                let elapsed = now.duration_since(oldest);
                if elapsed < Duration::from_secs(60) {
                    let wait_time = Duration::from_secs(60) - elapsed;
                    tracing::debug!(
                        wait_ms = wait_time.as_millis(),
                        "Rate limit: waiting for per-minute limit"
                    );
                    sleep(wait_time).await;
                }
            }
        }

        // Check adaptive interval since the last completed request
        if let Some(last) = self.last_completed {
            let elapsed = Instant::now().duration_since(last);
            let min_interval = self.current_interval();

            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                tracing::debug!(
                    wait_ms = wait_time.as_millis(),
                    throttles = self.consecutive_throttles,
                    "Rate limit: waiting for pacing interval"
                );
                sleep(wait_time).await;
            }
        }

        self.recent_requests.push(Instant::now());
    }

    /// Mark the in-flight request as finished; pacing is measured from here
    pub fn complete(&mut self) {
        self.last_completed = Some(Instant::now());
    }

    /// Record a successful response
    pub fn record_success(&mut self) {
        self.consecutive_throttles = self.consecutive_throttles.saturating_sub(1);
    }

    /// Record an HTTP 429 and return how long to back off before retrying
    pub fn record_throttle(&mut self) -> Duration {
        self.consecutive_throttles += 1;
        self.policy.backoff_for(self.consecutive_throttles)
    }

    /// Backoff before retrying a transport failure; leaves the throttle counter alone
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.policy.backoff_for(attempt)
    }

    /// Pacing interval currently in effect
    pub fn current_interval(&self) -> Duration {
        self.policy.interval_for(self.consecutive_throttles)
    }

    pub fn consecutive_throttles(&self) -> u32 {
        self.consecutive_throttles
    }

    /// Get the current number of requests in the last minute
    pub fn current_minute_count(&mut self) -> usize {
        let now = Instant::now();
        self.recent_requests
            .retain(|&timestamp| now.duration_since(timestamp) < Duration::from_secs(60));
        self.recent_requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min_interval_ms: u64, per_minute: u32) -> PacingPolicy {
        PacingPolicy {
            min_interval: Duration::from_millis(min_interval_ms),
            max_per_minute: per_minute,
            throttle_interval_factor: 0.5,
            backoff_base: Duration::from_secs(4),
            backoff_factor: 1.0,
            max_backoff: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_interval_measured_from_completion() {
        let mut limiter = RateLimiter::new(policy(200, 50));

        let start = Instant::now();

        // Make 3 requests - should take at least 400ms
        for _ in 0..3 {
            limiter.acquire().await;
            limiter.complete();
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(380)); // Allow some tolerance
    }

    #[tokio::test]
    async fn test_per_minute_window_counts_requests() {
        let mut limiter = RateLimiter::new(policy(0, 50));

        for _ in 0..3 {
            limiter.acquire().await;
            limiter.complete();
        }

        assert_eq!(limiter.current_minute_count(), 3);
    }

    #[test]
    fn test_backoff_strictly_increases_until_cap() {
        let mut limiter = RateLimiter::new(policy(1000, 50));

        let mut previous = Duration::ZERO;
        let mut reached_cap = false;
        for _ in 0..20 {
            let backoff = limiter.record_throttle();
            if previous < Duration::from_secs(60) {
                assert!(backoff > previous);
            }
            assert!(backoff <= Duration::from_secs(60));
            reached_cap |= backoff == Duration::from_secs(60);
            previous = backoff;
        }

        assert!(reached_cap);
        assert_eq!(limiter.consecutive_throttles(), 20);
    }

    #[test]
    fn test_first_throttle_backoff() {
        let mut limiter = RateLimiter::new(policy(1000, 50));
        // 4s * (1 + 1.0 * 1)
        assert_eq!(limiter.record_throttle(), Duration::from_secs(8));
        assert_eq!(limiter.record_throttle(), Duration::from_secs(12));
    }

    #[test]
    fn test_success_decays_throttle_counter() {
        let mut limiter = RateLimiter::new(policy(1000, 50));
        limiter.record_throttle();
        limiter.record_throttle();
        assert_eq!(limiter.current_interval(), Duration::from_millis(2000));

        limiter.record_success();
        assert_eq!(limiter.consecutive_throttles(), 1);
        assert_eq!(limiter.current_interval(), Duration::from_millis(1500));

        limiter.record_success();
        limiter.record_success();
        assert_eq!(limiter.consecutive_throttles(), 0);
        assert_eq!(limiter.current_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_negative_factors_are_clamped() {
        let config = RateLimitConfig {
            throttle_interval_factor: -2.0,
            backoff_factor: f64::NAN,
            ..RateLimitConfig::default()
        };
        let policy = PacingPolicy::from(&config);
        assert_eq!(policy.throttle_interval_factor, 0.0);
        assert_eq!(policy.backoff_factor, 0.0);

        for count in [0, 1, 5] {
            assert_eq!(policy.backoff_for(count), policy.backoff_base.min(policy.max_backoff));
            assert_eq!(policy.interval_for(count), policy.min_interval);
        }
    }

    #[test]
    fn test_huge_factor_saturates_at_cap() {
        let mut policy = policy(1000, 50);
        policy.backoff_factor = f64::MAX;
        policy.throttle_interval_factor = f64::MAX;

        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(60));
        assert_eq!(policy.interval_for(3), Duration::MAX);
    }

    #[test]
    fn test_current_minute_count() {
        let mut limiter = RateLimiter::new(policy(1000, 50));
        assert_eq!(limiter.current_minute_count(), 0);
    }
}
