//! Escalation ("lightning") state machine.
//!
//! Two modes: `dumb` (mechanical step execution) and `claude`
//! (assisted-reasoning). `AUTO_THRESHOLD` consecutive step failures strike
//! the machine into `claude` automatically; an explicit `igor.strike` does
//! the same regardless of the counter. `igor.powerdown` returns to `dumb`.
//! Grounded on `bridge-hub::doctor`'s small `Arc<RwLock<...>>`-backed state
//! struct with a narrow method surface.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bridge_core::CircularLog;
use parking_lot::RwLock;
use serde::Serialize;

/// The two execution modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightningMode {
    /// Mechanical, keyword/heuristic-driven step execution.
    Dumb,
    /// Assisted-reasoning mode: `igor.think` requests are answered instead
    /// of retried mechanically.
    Claude,
}

/// One recorded assisted-reasoning exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ThoughtEntry {
    /// Milliseconds since the epoch this thought was recorded.
    pub recorded_at_ms: u64,
    /// The prompt that was reasoned over.
    pub prompt: String,
    /// The reasoning result.
    pub thought: String,
}

/// A read-only snapshot of the escalation state, for the `/lightning`
/// control endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LightningStatus {
    /// Current mode.
    pub mode: LightningMode,
    /// Consecutive step failures observed since the last success or
    /// mode change.
    pub consecutive_failures: u32,
    /// Total number of times the machine has struck into `claude` mode.
    pub total_strikes: u64,
    /// The reason the most recent strike occurred, if any.
    pub last_strike_reason: Option<String>,
}

struct Inner {
    mode: LightningMode,
    consecutive_failures: u32,
    total_strikes: u64,
    last_strike_reason: Option<String>,
}

/// The escalation state machine. Cheap to clone.
#[derive(Clone)]
pub struct LightningState {
    inner: Arc<RwLock<Inner>>,
    auto_threshold: u32,
    history: Arc<CircularLog<ThoughtEntry>>,
}

impl LightningState {
    /// Creates a state machine starting in `dumb` mode, auto-striking after
    /// `auto_threshold` consecutive failures, keeping up to `history_size`
    /// thinking-history entries.
    pub fn new(auto_threshold: u32, history_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                mode: LightningMode::Dumb,
                consecutive_failures: 0,
                total_strikes: 0,
                last_strike_reason: None,
            })),
            auto_threshold,
            history: Arc::new(CircularLog::new(history_size)),
        }
    }

    /// Records a step success: resets the consecutive-failure counter, but
    /// does not itself power down an already-struck machine (`igor
    /// .powerdown` is explicit).
    pub fn record_success(&self) {
        self.inner.write().consecutive_failures = 0;
    }

    /// Records a step failure, auto-striking into `claude` mode once
    /// `auto_threshold` consecutive failures accumulate. Returns `true` if
    /// this call caused a strike.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.write();
        inner.consecutive_failures += 1;
        if inner.mode == LightningMode::Dumb && inner.consecutive_failures >= self.auto_threshold {
            self.strike_locked(&mut inner, "auto: consecutive step failures");
            true
        } else {
            false
        }
    }

    /// Explicitly strikes into `claude` mode regardless of the failure
    /// counter (`igor.strike`).
    pub fn strike(&self, reason: impl Into<String>) {
        let mut inner = self.inner.write();
        self.strike_locked(&mut inner, reason);
    }

    fn strike_locked(&self, inner: &mut Inner, reason: impl Into<String>) {
        inner.mode = LightningMode::Claude;
        inner.total_strikes += 1;
        inner.last_strike_reason = Some(reason.into());
        metrics::counter!(crate::metrics::METRICS_ID_LIGHTNING_STRIKES).increment(1);
        metrics::gauge!(crate::metrics::METRICS_ID_LIGHTNING_MODE).set(1.0);
    }

    /// Returns to `dumb` mode (`igor.powerdown`).
    pub fn power_down(&self) {
        let mut inner = self.inner.write();
        inner.mode = LightningMode::Dumb;
        inner.consecutive_failures = 0;
        metrics::gauge!(crate::metrics::METRICS_ID_LIGHTNING_MODE).set(0.0);
    }

    /// Returns the current mode.
    pub fn mode(&self) -> LightningMode {
        self.inner.read().mode
    }

    /// Records an assisted-reasoning exchange (`igor.think`), regardless of
    /// current mode (a `think` request implicitly counts as reasoning).
    pub fn record_thought(&self, prompt: String, thought: String) {
        self.history.push(ThoughtEntry { recorded_at_ms: now_millis(), prompt, thought });
    }

    /// Returns the most recent `limit` thinking-history entries.
    pub fn history(&self, limit: usize) -> Vec<ThoughtEntry> {
        self.history.recent(limit)
    }

    /// Returns a snapshot of the current state.
    pub fn status(&self) -> LightningStatus {
        let inner = self.inner.read();
        LightningStatus {
            mode: inner.mode,
            consecutive_failures: inner.consecutive_failures,
            total_strikes: inner.total_strikes,
            last_strike_reason: inner.last_strike_reason.clone(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_strikes_after_threshold_consecutive_failures() {
        let state = LightningState::new(3, 10);
        assert!(!state.record_failure());
        assert!(!state.record_failure());
        assert!(state.record_failure());
        assert_eq!(state.mode(), LightningMode::Claude);
    }

    #[test]
    fn success_resets_counter_without_powering_down() {
        let state = LightningState::new(3, 10);
        state.record_failure();
        state.record_failure();
        state.record_success();
        assert!(!state.record_failure());
        assert_eq!(state.status().consecutive_failures, 1);
    }

    #[test]
    fn explicit_strike_bypasses_threshold() {
        let state = LightningState::new(10, 10);
        state.strike("manual escalation");
        assert_eq!(state.mode(), LightningMode::Claude);
        assert_eq!(state.status().last_strike_reason.as_deref(), Some("manual escalation"));
    }

    #[test]
    fn powerdown_returns_to_dumb() {
        let state = LightningState::new(1, 10);
        state.record_failure();
        assert_eq!(state.mode(), LightningMode::Claude);
        state.power_down();
        assert_eq!(state.mode(), LightningMode::Dumb);
    }
}
