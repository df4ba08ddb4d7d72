//! Protocol-level errors the router may encounter while processing a single
//! frame, and their conversion into a structured `error` response frame.
//!
//! Transport/protocol failures never propagate as a caller-visible `Result`
//! error from the router's hot path — they are folded into a wire response
//! and the router moves on to the next frame.

use bridge_types::Message;
use uuid::Uuid;

/// Errors the router can encounter while processing one inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The per-connection token bucket had no tokens available.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the sender should wait before retrying.
        retry_after_secs: u64,
    },
    /// The frame was shed under memory pressure.
    #[error("message shed under memory pressure")]
    LoadShed,
    /// The frame exceeded the configured maximum size.
    #[error("message size {actual} exceeds maximum {max}")]
    OversizeFrame {
        /// The frame's actual size in bytes.
        actual: usize,
        /// The configured maximum, in bytes.
        max: usize,
    },
    /// The frame was not valid JSON.
    #[error(transparent)]
    Malformed(#[from] serde_json::Error),
    /// A required field was missing or a component-id was syntactically
    /// invalid.
    #[error("schema error: {0}")]
    Schema(String),
    /// Signing is required and the message was unsigned or failed to
    /// verify.
    #[error("signature verification failed")]
    SignatureInvalid,
    /// `target` did not resolve to a registered component.
    #[error("target not connected")]
    TargetNotConnected,
    /// The target's circuit breaker rejected the request.
    #[error("circuit breaker open")]
    CircuitOpen,
}

impl RouterError {
    /// Builds the structured `error` frame the sender receives for this
    /// failure, echoing `correlation_id` when available so the sender can
    /// match the rejection to its originating request.
    pub fn into_error_message(self, source: bridge_types::ComponentName, correlation_id: Option<Uuid>) -> Message {
        let mut payload = serde_json::json!({ "error": self.to_string() });
        if let RouterError::RateLimited { retry_after_secs } = &self {
            payload["retryAfter"] = serde_json::json!(retry_after_secs);
        }
        let mut message = Message::new(
            source,
            bridge_types::ComponentId::Broadcast,
            bridge_types::wire::ERROR,
            payload,
            "0000-00-00".to_string(),
        );
        message.correlation_id = correlation_id;
        message
    }
}
