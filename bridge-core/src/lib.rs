//! Algorithmic primitives shared by the bridge cluster's hub and workers:
//! bounded buffers, a dead-letter queue, token-bucket rate limiting, a
//! three-state circuit breaker, and a bucketed sliding-window counter.
//!
//! Deliberately independent of `bridge-types` — every type here is generic
//! over the id/target/message types its caller uses, the same way the
//! cryptographic core of this cluster's teacher crate has no dependency on
//! its own wire-format crate.

#![deny(missing_docs)]

pub mod buffers;
pub mod circuit_breaker;
pub mod dlq;
pub mod rate_limiter;
pub mod sliding_window;

pub use buffers::{CircularLog, SeenCache};
pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStats};
pub use dlq::{DeadLetter, DeadLetterQueue};
pub use rate_limiter::RateLimiter;
pub use sliding_window::SlidingWindowCounter;
