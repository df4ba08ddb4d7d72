//! Bucketed sliding-window counter (C4).

use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Buckets {
    /// Count per bucket, indexed by `bucket_index % buckets.len()`.
    counts: Vec<u64>,
    /// The bucket index (since an arbitrary epoch) each slot currently
    /// represents; any slot whose `slot_index` is stale is treated as zero
    /// the next time it's touched.
    slot_index: Vec<i64>,
    anchor: Instant,
}

/// A fixed-horizon counter divided into `K` equal-width buckets, giving an
/// approximate count over the trailing horizon `H` in O(K) memory rather
/// than storing every event timestamp.
pub struct SlidingWindowCounter {
    buckets: Mutex<Buckets>,
    bucket_width: Duration,
    horizon: Duration,
}

impl SlidingWindowCounter {
    /// Creates a counter over trailing window `horizon`, split into
    /// `num_buckets` buckets (so each bucket spans `horizon / num_buckets`).
    ///
    /// # Panics
    /// Panics if `num_buckets` is zero.
    pub fn new(horizon: Duration, num_buckets: usize) -> Self {
        assert!(num_buckets > 0, "SlidingWindowCounter needs at least one bucket");
        let bucket_width = horizon / num_buckets as u32;
        Self {
            buckets: Mutex::new(Buckets {
                counts: vec![0; num_buckets],
                slot_index: vec![i64::MIN; num_buckets],
                anchor: Instant::now(),
            }),
            bucket_width,
            horizon,
        }
    }

    fn current_bucket_index(&self, buckets: &Buckets) -> i64 {
        let elapsed = buckets.anchor.elapsed();
        (elapsed.as_nanos() / self.bucket_width.as_nanos().max(1)) as i64
    }

    /// Rolls any stale slots (ones representing a bucket index older than
    /// the current window) back to zero.
    fn roll(&self, buckets: &mut Buckets, now_index: i64) {
        let num_buckets = buckets.counts.len() as i64;
        for slot in 0..buckets.counts.len() {
            let age = now_index - buckets.slot_index[slot];
            if buckets.slot_index[slot] == i64::MIN || age >= num_buckets || age < 0 {
                buckets.counts[slot] = 0;
                buckets.slot_index[slot] = now_index;
            }
        }
    }

    /// Records one event at the current time.
    pub fn increment(&self) {
        let mut buckets = self.buckets.lock();
        let now_index = self.current_bucket_index(&buckets);
        self.roll(&mut buckets, now_index);
        let num_buckets = buckets.counts.len();
        let slot = (now_index.rem_euclid(num_buckets as i64)) as usize;
        if buckets.slot_index[slot] != now_index {
            buckets.counts[slot] = 0;
            buckets.slot_index[slot] = now_index;
        }
        buckets.counts[slot] += 1;
    }

    /// Returns the approximate count of events within the trailing horizon.
    pub fn count(&self) -> u64 {
        let mut buckets = self.buckets.lock();
        let now_index = self.current_bucket_index(&buckets);
        self.roll(&mut buckets, now_index);
        buckets.counts.iter().sum()
    }

    /// The configured trailing horizon.
    pub fn horizon(&self) -> Duration {
        self.horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn counts_events_within_horizon() {
        let counter = SlidingWindowCounter::new(Duration::from_millis(200), 4);
        for _ in 0..5 {
            counter.increment();
        }
        assert_eq!(counter.count(), 5);
    }

    #[test]
    fn old_buckets_age_out_of_the_window() {
        let counter = SlidingWindowCounter::new(Duration::from_millis(80), 4);
        counter.increment();
        counter.increment();
        sleep(Duration::from_millis(100));
        assert_eq!(counter.count(), 0, "entire horizon has elapsed");
    }

    #[test]
    fn partial_aging_drops_only_the_oldest_bucket() {
        let counter = SlidingWindowCounter::new(Duration::from_millis(100), 5);
        counter.increment();
        sleep(Duration::from_millis(60));
        counter.increment();
        counter.increment();
        assert!(counter.count() >= 2, "at least the two recent events remain");
    }

    #[test]
    fn horizon_is_reported_verbatim() {
        let counter = SlidingWindowCounter::new(Duration::from_secs(60), 6);
        assert_eq!(counter.horizon(), Duration::from_secs(60));
    }
}
