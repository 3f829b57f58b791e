//! Sliding-window rate limiting keyed by caller identifier.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Longest window accepted; larger configured values are clamped.
const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

/// Quota for one protection tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of requests admitted inside one window.
    pub limit: usize,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Upper bound on distinct identifiers tracked at once (`None` = unbounded).
    #[serde(default)]
    pub max_tracked: Option<usize>,
}

impl RateLimitConfig {
    /// 100 requests per hour.
    pub fn global() -> Self {
        Self {
            limit: 100,
            window_secs: 3600,
            max_tracked: None,
        }
    }

    /// 5 attempts per 15 minutes.
    pub fn auth() -> Self {
        Self {
            limit: 5,
            window_secs: 900,
            max_tracked: None,
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.min(MAX_WINDOW_SECS) as i64)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::global()
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was counted against the window.
    Admitted,
    /// The quota is exhausted; `retry_after` is in whole seconds.
    Rejected { retry_after: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Sliding-window limiter.
///
/// State is kept in a sharded map: checks for different identifiers only
/// contend when they hash to the same shard, while every check for one
/// identifier runs under that identifier's shard write lock, so a burst can
/// never be admitted past `limit`.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    window: Duration,
    entries: DashMap<String, Vec<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let window = config.window();
        Self {
            config,
            window,
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns `true` and records the request if `identifier` is under quota.
    pub fn admit(&self, identifier: &str) -> bool {
        self.check(identifier).is_admitted()
    }

    /// Checks `identifier` against the window and records the request if admitted.
    pub fn check(&self, identifier: &str) -> Admission {
        let now = self.clock.now();
        let window_start = now - self.window;

        if !self.entries.contains_key(identifier) {
            self.make_room(window_start);
        }

        let mut entry = self.entries.entry(identifier.to_string()).or_default();
        let timestamps = entry.value_mut();
        timestamps.retain(|t| *t > window_start);

        if timestamps.len() >= self.config.limit {
            let remaining = timestamps
                .first()
                .map(|oldest| *oldest + self.window - now)
                .unwrap_or(self.window);
            // Round up: the slot only frees once `now >= oldest + window`.
            let retry_after = (remaining.num_milliseconds().max(0) as u64)
                .div_ceil(1000)
                .max(1);

            debug!(identifier, retry_after, "rate limit exceeded");
            return Admission::Rejected { retry_after };
        }

        timestamps.push(now);
        Admission::Admitted
    }

    /// Drops expired timestamps everywhere and forgets idle identifiers.
    ///
    /// Returns the number of identifiers removed.
    pub fn sweep(&self) -> usize {
        let window_start = self.clock.now() - self.window;
        let before = self.entries.len();

        self.entries.retain(|_, timestamps| {
            timestamps.retain(|t| *t > window_start);
            !timestamps.is_empty()
        });

        before.saturating_sub(self.entries.len())
    }

    /// Number of identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }

    // Approximate under concurrency: two new identifiers racing past the
    // check can overshoot `max_tracked` by one each.
    // One scan evicts a whole batch of the stalest identifiers.
    fn make_room(&self, window_start: DateTime<Utc>) {
        let Some(max) = self.config.max_tracked else {
            return;
        };
        if self.entries.len() < max {
            return;
        }

        let mut last_seen: Vec<(Option<DateTime<Utc>>, String)> =
            Vec::with_capacity(self.entries.len());
        self.entries.retain(|key, timestamps| {
            timestamps.retain(|t| *t > window_start);
            if timestamps.is_empty() {
                return false;
            }
            last_seen.push((timestamps.last().copied(), key.clone()));
            true
        });

        let len = self.entries.len();
        if len < max {
            return;
        }

        let batch = (len + 1 - max).max(eviction_batch(max)).min(last_seen.len());
        if batch == 0 {
            return;
        }
        last_seen.select_nth_unstable(batch - 1);
        for (_, key) in last_seen.drain(..batch) {
            debug!(identifier = %key, "evicting least recently active identifier");
            self.entries.remove(&key);
        }
    }
}

/// Identifiers evicted at once when the cap is reached.
fn eviction_batch(max: usize) -> usize {
    (max / 8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(limit: usize, window_secs: u64) -> (SlidingWindowLimiter, ManualClock) {
        let clock = ManualClock::starting_now();
        let config = RateLimitConfig {
            limit,
            window_secs,
            max_tracked: None,
        };
        (
            SlidingWindowLimiter::with_clock(config, Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_limit_then_reject_then_recover() {
        let (limiter, clock) = limiter(5, 60);

        for _ in 0..5 {
            assert!(limiter.admit("1.2.3.4"));
            clock.advance(Duration::milliseconds(100));
        }
        assert!(!limiter.admit("1.2.3.4"));

        clock.advance(Duration::seconds(61));
        assert!(limiter.admit("1.2.3.4"));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (limiter, _clock) = limiter(1, 60);

        assert!(limiter.admit("10.0.0.1"));
        assert!(!limiter.admit("10.0.0.1"));
        assert!(limiter.admit("10.0.0.2"));
    }

    #[test]
    fn test_rejection_does_not_consume_quota() {
        let (limiter, clock) = limiter(2, 10);

        assert!(limiter.admit("a"));
        clock.advance(Duration::seconds(5));
        assert!(limiter.admit("a"));
        for _ in 0..10 {
            assert!(!limiter.admit("a"));
        }

        // The first request leaves the window; rejected calls were not recorded.
        clock.advance(Duration::seconds(6));
        assert!(limiter.admit("a"));
    }

    #[test]
    fn test_retry_after_counts_down_to_oldest_expiry() {
        let (limiter, clock) = limiter(1, 60);

        assert!(limiter.admit("a"));
        clock.advance(Duration::seconds(20));

        assert_eq!(limiter.check("a"), Admission::Rejected { retry_after: 40 });
    }

    #[test]
    fn test_boundary_timestamp_is_outside_window() {
        let (limiter, clock) = limiter(1, 60);

        assert!(limiter.admit("a"));
        clock.advance(Duration::seconds(60));

        // window_start == first timestamp, which is no longer strictly inside.
        assert!(limiter.admit("a"));
    }

    #[test]
    fn test_sweep_forgets_idle_identifiers() {
        let (limiter, clock) = limiter(3, 60);

        limiter.admit("a");
        limiter.admit("b");
        clock.advance(Duration::seconds(30));
        limiter.admit("c");
        clock.advance(Duration::seconds(31));

        assert_eq!(limiter.sweep(), 2);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_max_tracked_evicts_stalest_identifier() {
        let clock = ManualClock::starting_now();
        let config = RateLimitConfig {
            limit: 1,
            window_secs: 3600,
            max_tracked: Some(2),
        };
        let limiter = SlidingWindowLimiter::with_clock(config, Arc::new(clock.clone()));

        assert!(limiter.admit("a"));
        clock.advance(Duration::seconds(1));
        assert!(limiter.admit("b"));
        clock.advance(Duration::seconds(1));
        assert!(limiter.admit("c"));

        assert_eq!(limiter.tracked(), 2);
        // "a" was evicted, so its quota starts over.
        assert!(limiter.admit("a"));
    }

    #[test]
    fn test_waiting_retry_after_is_enough() {
        let (limiter, clock) = limiter(1, 60);

        assert!(limiter.admit("a"));
        clock.advance(Duration::milliseconds(20_500));

        let Admission::Rejected { retry_after } = limiter.check("a") else {
            panic!("second request inside the window must be rejected");
        };
        assert_eq!(retry_after, 40);

        clock.advance(Duration::seconds(retry_after as i64));
        assert!(limiter.admit("a"));
    }

    #[test]
    fn test_full_cap_evicts_a_batch_of_stalest() {
        let clock = ManualClock::starting_now();
        let config = RateLimitConfig {
            limit: 1,
            window_secs: 3600,
            max_tracked: Some(16),
        };
        let limiter = SlidingWindowLimiter::with_clock(config, Arc::new(clock.clone()));

        for i in 0..16 {
            assert!(limiter.admit(&format!("id{i}")));
            clock.advance(Duration::seconds(1));
        }
        assert!(limiter.admit("newcomer"));

        // Two stalest dropped in one pass, leaving room for the next newcomer.
        assert_eq!(limiter.tracked(), 15);
        assert!(!limiter.admit("id2"));
        assert!(limiter.admit("id0"));
        assert_eq!(limiter.tracked(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_burst_never_exceeds_limit() {
        let limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig {
            limit: 25,
            window_secs: 60,
            max_tracked: None,
        }));

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.admit("burst") })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 25);
    }
}
