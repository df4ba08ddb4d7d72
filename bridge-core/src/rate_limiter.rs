//! Per-key token bucket rate limiting (C2).

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

/// A per-key token bucket rate limiter.
///
/// Buckets are created lazily on first use and reaped by
/// [`RateLimiter::reap_idle`] once they've been idle beyond a configured
/// age, so a cluster with many short-lived connection keys doesn't leak
/// memory.
pub struct RateLimiter<K> {
    buckets: Mutex<HashMap<K, Bucket>>,
    refill_rate_per_sec: f64,
    burst: f64,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Creates a limiter refilling at `refill_rate_per_sec` tokens/sec, with
    /// burst capacity `burst`.
    pub fn new(refill_rate_per_sec: f64, burst: f64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            refill_rate_per_sec,
            burst,
        }
    }

    /// Refills and attempts to consume one token for `key`. Returns `true`
    /// (and consumes a token) iff at least one token was available.
    pub fn allow(&self, key: K) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
            last_used: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate_per_sec).min(self.burst);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns the number of whole seconds a caller should wait before
    /// retrying, given the current token deficit for `key`. Returns `0` if
    /// the key has no bucket yet (i.e. it would be immediately admitted).
    pub fn retry_after_secs(&self, key: &K) -> u64 {
        let buckets = self.buckets.lock();
        match buckets.get(key) {
            Some(bucket) if bucket.tokens < 1.0 => {
                let deficit = 1.0 - bucket.tokens;
                (deficit / self.refill_rate_per_sec).ceil() as u64
            }
            _ => 0,
        }
    }

    /// Removes every bucket whose last use predates `now - max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_used) < max_idle);
    }

    /// Returns the number of distinct keys with a live bucket.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn burst_admits_up_to_b_then_blocks() {
        let limiter = RateLimiter::new(1.0, 3.0);
        assert!(limiter.allow("conn-1"));
        assert!(limiter.allow("conn-1"));
        assert!(limiter.allow("conn-1"));
        assert!(!limiter.allow("conn-1"), "burst exhausted");
    }

    #[test]
    fn refill_allows_steady_state_admission() {
        let limiter = RateLimiter::new(50.0, 1.0);
        assert!(limiter.allow("conn-1"));
        assert!(!limiter.allow("conn-1"));
        sleep(Duration::from_millis(40));
        assert!(limiter.allow("conn-1"), "should have refilled by ~2 tokens");
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1.0, 1.0);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn reap_idle_removes_stale_buckets() {
        let limiter = RateLimiter::new(1.0, 1.0);
        limiter.allow("a");
        sleep(Duration::from_millis(30));
        limiter.reap_idle(Duration::from_millis(10));
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
