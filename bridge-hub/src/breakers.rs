//! Per-target circuit breaker registry, lazily populated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::{CircuitBreaker, CircuitState};
use bridge_types::ComponentName;
use parking_lot::RwLock;

/// A registry handing out one [`CircuitBreaker`] per target component name,
/// created on first use.
#[derive(Clone)]
pub struct BreakerRegistry {
    inner: Arc<RwLock<HashMap<ComponentName, Arc<CircuitBreaker>>>>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl BreakerRegistry {
    /// Creates an empty registry; every breaker it hands out opens after
    /// `failure_threshold` consecutive failures and probes again after
    /// `reset_timeout`.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            failure_threshold,
            reset_timeout,
        }
    }

    /// Returns the breaker for `target`, creating one (with a gauge-updating
    /// transition callback) if this is the first time it's addressed.
    pub fn get_or_create(&self, target: &ComponentName) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.inner.read().get(target) {
            return existing.clone();
        }
        let mut registry = self.inner.write();
        registry
            .entry(target.clone())
            .or_insert_with(|| {
                let label = target.to_string();
                Arc::new(CircuitBreaker::with_callback(
                    self.failure_threshold,
                    self.reset_timeout,
                    move |state| {
                        metrics::gauge!("bridge.hub.circuit.state", "target" => label.clone())
                            .set(circuit_state_to_f64(state));
                    },
                ))
            })
            .clone()
    }

    /// Resets the breaker for `name`, if one exists. Returns `true` if a
    /// breaker was found and reset.
    pub fn reset(&self, name: &ComponentName) -> bool {
        match self.inner.read().get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Returns a snapshot of every breaker's state and counters, for the
    /// `/circuits` debug endpoint.
    pub fn snapshot(&self) -> Vec<(ComponentName, bridge_core::CircuitStats)> {
        self.inner
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.stats()))
            .collect()
    }
}

fn circuit_state_to_f64(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 0.5,
        CircuitState::Open => 1.0,
    }
}
