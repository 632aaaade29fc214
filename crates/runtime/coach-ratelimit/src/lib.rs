//! Fixed-window rate limiter.
//!
//! One bucket per identifier (user id, or client address for anonymous
//! callers), allowing `max_requests` per window. The bucket map is bounded:
//! when it reaches `max_keys`, expired windows are swept, and if that frees
//! nothing the bucket closest to expiry is evicted.
//!
//! Buckets are process-local. Several instances behind a load balancer each
//! enforce their own limit.

use coach_core::{Error, Result};
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    window: Duration,
    max_requests: u32,
    max_keys: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32, max_keys: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            window,
            max_requests: max_requests.max(1),
            max_keys: max_keys.max(1),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Number of tracked identifiers
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Count one request for `key`
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` at time `now`
    pub fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        if !self.buckets.contains_key(key) && self.buckets.len() >= self.max_keys {
            self.make_room(now);
        }

        let window = self.window;
        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            count: 0,
            reset_at: now + window,
        });
        let bucket = entry.value_mut();

        if bucket.reset_at < now {
            bucket.count = 0;
            bucket.reset_at = now + window;
        }

        if bucket.count >= self.max_requests {
            let retry_after = bucket.reset_at.saturating_duration_since(now);
            tracing::warn!(key, count = bucket.count, "rate limit exceeded");
            return Err(Error::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        bucket.count += 1;
        Ok(())
    }

    /// Requests left for `key` in its current window
    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        match self.buckets.get(key) {
            Some(bucket) if bucket.reset_at >= now => self.max_requests.saturating_sub(bucket.count),
            _ => self.max_requests,
        }
    }

    /// Drop every bucket whose window has ended. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.reset_at >= now);
        before.saturating_sub(self.buckets.len())
    }

    fn make_room(&self, now: Instant) {
        let swept = self.sweep(now);
        if swept > 0 {
            tracing::debug!(swept, "swept expired rate-limit windows");
            return;
        }

        let oldest = self
            .buckets
            .iter()
            .min_by_key(|entry| entry.value().reset_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.buckets.remove(&key);
            tracing::debug!(evicted = %key, "rate-limit table full, evicted bucket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, max_keys: usize) -> RateLimiter {
        RateLimiter::new(Duration::from_secs(60), max_requests, max_keys)
    }

    #[test]
    fn test_allows_up_to_capacity() {
        let limiter = limiter(10, 100);
        let now = Instant::now();
        for _ in 0..10 {
            limiter.check_at("user-1", now).unwrap();
        }
        let err = limiter.check_at("user-1", now).unwrap_err();
        assert!(matches!(err, Error::RateLimited { retry_after_secs: 60 }));
        assert_eq!(limiter.remaining_at("user-1", now), 0);
    }

    #[test]
    fn test_window_resets() {
        let limiter = limiter(2, 100);
        let start = Instant::now();
        limiter.check_at("k", start).unwrap();
        limiter.check_at("k", start).unwrap();
        assert!(limiter.check_at("k", start + Duration::from_secs(30)).is_err());

        let later = start + Duration::from_secs(61);
        limiter.check_at("k", later).unwrap();
        assert_eq!(limiter.remaining_at("k", later), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1, 100);
        let now = Instant::now();
        limiter.check_at("a", now).unwrap();
        assert!(limiter.check_at("a", now).is_err());
        limiter.check_at("b", now).unwrap();
    }

    #[test]
    fn test_table_is_bounded_by_sweep() {
        let limiter = limiter(5, 3);
        let start = Instant::now();
        for key in ["a", "b", "c"] {
            limiter.check_at(key, start).unwrap();
        }

        let later = start + Duration::from_secs(120);
        limiter.check_at("d", later).unwrap();
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_table_is_bounded_by_eviction() {
        let limiter = limiter(5, 2);
        let start = Instant::now();
        limiter.check_at("old", start).unwrap();
        limiter.check_at("new", start + Duration::from_secs(10)).unwrap();

        limiter.check_at("third", start + Duration::from_secs(20)).unwrap();
        assert_eq!(limiter.len(), 2);
        assert_eq!(limiter.remaining_at("new", start + Duration::from_secs(20)), 4);
        assert_eq!(limiter.remaining_at("old", start + Duration::from_secs(20)), 5);
    }

    #[test]
    fn test_sweep_counts_removed() {
        let limiter = limiter(5, 10);
        let start = Instant::now();
        limiter.check_at("a", start).unwrap();
        limiter.check_at("b", start + Duration::from_secs(50)).unwrap();
        assert_eq!(limiter.sweep(start + Duration::from_secs(70)), 1);
        assert_eq!(limiter.len(), 1);
    }
}
