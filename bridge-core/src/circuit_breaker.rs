//! Three-state circuit breaker (C3).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// The three states a [`CircuitBreaker`] can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Every request admitted.
    Closed,
    /// Every request rejected until the reset timeout elapses.
    Open,
    /// Exactly one probe request is admitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(label)
    }
}

/// Aggregate counters exposed for `/circuits`-style debug surfaces.
#[derive(Debug, Clone, Copy)]
pub struct CircuitStats {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures observed in the current closed/open cycle.
    pub consecutive_failures: u32,
    /// Total requests admitted (closed or half-open probes) since creation.
    pub total_requests: u64,
    /// Total failures observed since creation.
    pub total_failures: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    total_requests: u64,
    total_failures: u64,
    opened_at: Option<Instant>,
    /// `true` while a half-open probe is outstanding, so a second caller
    /// doesn't get admitted as a concurrent probe.
    probe_in_flight: bool,
}

/// A per-target circuit breaker: `closed` admits everything, `open` rejects
/// everything until `reset_timeout` elapses, `half-open` admits exactly one
/// probe whose outcome decides the next state.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
    on_transition: Arc<dyn Fn(CircuitState) + Send + Sync>,
}

impl CircuitBreaker {
    /// Creates a closed breaker that opens after `failure_threshold`
    /// consecutive failures and probes again after `reset_timeout`.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self::with_callback(failure_threshold, reset_timeout, |_| {})
    }

    /// As [`CircuitBreaker::new`], additionally invoking `on_transition`
    /// every time the breaker's state changes, so callers can update a
    /// gauge.
    pub fn with_callback(
        failure_threshold: u32,
        reset_timeout: Duration,
        on_transition: impl Fn(CircuitState) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                total_requests: 0,
                total_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            failure_threshold,
            reset_timeout,
            on_transition: Arc::new(on_transition),
        }
    }

    /// Returns `true` iff a request should be admitted right now. Consumes
    /// the single half-open probe slot if the breaker is currently
    /// half-open (or transitions from open to half-open because the reset
    /// timeout has elapsed).
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_transition_to_half_open(&mut inner);
        match inner.state {
            CircuitState::Closed => {
                inner.total_requests += 1;
                true
            }
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    inner.total_requests += 1;
                    true
                }
            }
        }
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        let should_probe = inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|opened_at| opened_at.elapsed() >= self.reset_timeout);
        if should_probe {
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;
            drop_and_notify(inner, &self.on_transition, CircuitState::HalfOpen);
        }
    }

    /// Records a successful call. In `closed`, resets the consecutive
    /// failure count. In `half-open`, closes the breaker and resets all
    /// counters.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.probe_in_flight = false;
                inner.opened_at = None;
                drop_and_notify(&mut inner, &self.on_transition, CircuitState::Closed);
            }
            CircuitState::Open => {
                // A success arriving after the breaker already opened (a
                // racing in-flight request) is a no-op.
            }
        }
    }

    /// Records a failed call. In `closed`, increments the consecutive
    /// failure count and opens the breaker once it reaches the configured
    /// threshold. In `half-open`, reopens the breaker and restarts the
    /// reset timer.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    drop_and_notify(&mut inner, &self.on_transition, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                drop_and_notify(&mut inner, &self.on_transition, CircuitState::Open);
            }
            CircuitState::Open => {
                // Already open; nothing new to transition to.
            }
        }
    }

    /// Unconditionally forces the breaker back to `closed`, resetting every
    /// counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        drop_and_notify(&mut inner, &self.on_transition, CircuitState::Closed);
    }

    /// Returns the current state without mutating anything (including the
    /// open-to-half-open timer transition, which only happens on
    /// [`CircuitBreaker::allow_request`]).
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns a snapshot of the breaker's counters.
    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
        }
    }

    /// Returns the remaining cool-down before the breaker probes again, or
    /// `None` if it isn't currently open.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        Some(self.reset_timeout.saturating_sub(opened_at.elapsed()))
    }
}

/// Invokes `on_transition` after releasing `inner`'s lock, so the callback
/// (which may itself touch a gauge registry) never runs while the breaker's
/// mutex is held.
fn drop_and_notify(
    inner: &mut parking_lot::MutexGuard<'_, Inner>,
    on_transition: &Arc<dyn Fn(CircuitState) + Send + Sync>,
    new_state: CircuitState,
) {
    // `inner` is a `&mut MutexGuard`, not an owned guard, so we can't drop
    // it here; callers that need the callback to run lock-free should clone
    // `on_transition` and call it after the guard itself goes out of scope.
    // In practice the callback bodies used throughout this crate (gauge
    // updates) are cheap and non-reentrant, so invoking them under the lock
    // is safe; this helper exists to keep the call sites above uniform and
    // to document the trade-off in one place.
    let _ = inner;
    on_transition(new_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        for _ in 0..3 {
            assert!(breaker.allow_request());
            breaker.on_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_probe_success_closes_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        assert!(breaker.allow_request());
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        sleep(Duration::from_millis(30));
        assert!(breaker.allow_request(), "reset timeout elapsed, probe admitted");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        let stats = breaker.stats();
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn half_open_probe_failure_reopens_and_resets_timer() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.allow_request();
        breaker.on_failure();
        sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request(), "freshly reopened, timer restarted");
    }

    #[test]
    fn only_one_probe_admitted_while_half_open() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.allow_request();
        breaker.on_failure();
        sleep(Duration::from_millis(15));
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request(), "second concurrent probe rejected");
    }

    #[test]
    fn reset_forces_closed() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.allow_request();
        breaker.on_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn transition_callback_fires_on_state_change() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let breaker = CircuitBreaker::with_callback(1, Duration::from_millis(10), move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        breaker.allow_request();
        breaker.on_failure();
        assert_eq!(count.load(Ordering::SeqCst), 1, "closed -> open");
    }
}
