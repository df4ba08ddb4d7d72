//! Step-retry backoff:
//! `delay = clamp(BASE * 2^attempt, BASE/2, MAX)` with +/-20% uniform
//! jitter, `BASE = 1s`, `MAX = 30s`.
//!
//! This is a hand-rolled formula rather than `backon`'s builder: the
//! clamp-then-jitter shape here has an explicit floor at `BASE/2` and a
//! narrow jitter band rather than `backon`'s full-range randomization.
//! `backon::ExponentialBuilder` drives the hub reconnect loop in
//! `hub_client` instead, where an off-the-shelf builder fits directly.

use std::time::Duration;

use rand::Rng;

/// The base delay before the first retry.
pub const BASE: Duration = Duration::from_secs(1);
/// The floor every computed delay is clamped to.
pub const FLOOR: Duration = Duration::from_millis(500);
/// The ceiling every computed delay is clamped to.
pub const MAX: Duration = Duration::from_secs(30);

/// Computes the jittered backoff delay for the `attempt`'th retry
/// (0-indexed: `attempt == 0` is the first retry after an initial failure).
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let exp = BASE.as_secs_f64() * 2f64.powi(attempt as i32);
    let clamped = exp.clamp(FLOOR.as_secs_f64(), MAX.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
    Duration::from_secs_f64((clamped * (1.0 + jitter)).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_near_base() {
        let delay = delay_for_attempt(0);
        assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1_200));
    }

    #[test]
    fn grows_exponentially_then_clamps_to_max() {
        let delay = delay_for_attempt(10);
        assert!(delay <= Duration::from_secs(36), "never exceeds MAX plus jitter band");
        assert!(delay >= Duration::from_secs(24));
    }
}
