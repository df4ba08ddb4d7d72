//! The wire [`Message`] envelope shared by every component in the cluster.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::component::{ComponentId, ComponentName};

/// Default maximum encoded frame size (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// A dot-notation message type, e.g. `plan.submit`, `step.completed`.
///
/// The router is type-agnostic except for a handful of control types (see
/// [`crate::wire`]); this wrapper exists purely so call sites don't compare
/// raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(String);

impl MessageType {
    /// Wraps a raw dot-notation type string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the type as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The unit of inter-component communication.
///
/// Invariants enforced elsewhere in the pipeline: `id` unique within the
/// seen window, `source`/`target` syntactically valid, size bounded,
/// signature verified when required, `correlationId` hub-filled when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Collision-resistant message id.
    pub id: Uuid,
    /// Monotonic-ish send timestamp (milliseconds since the epoch).
    pub timestamp: i64,
    /// Logical source component. Never [`ComponentId::Broadcast`]; callers
    /// that need to construct a `Message` from an already-registered
    /// connection should use [`ComponentName`] directly at that layer.
    pub source: ComponentName,
    /// Routing target: a specific component, or [`ComponentId::Broadcast`].
    pub target: ComponentId,
    /// Dot-notation message type.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Opaque, type-dependent structured payload.
    pub payload: serde_json::Value,
    /// Sender's protocol/software version string.
    pub version: String,
    /// Identifier threading a cause (e.g. a plan) through all derived
    /// messages. Filled in by the hub when absent.
    #[serde(default, rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// HMAC signature over the canonical encoding of every field above,
    /// present only when signing is enabled cluster-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Message {
    /// Builds a new, unsigned message with a fresh id and the current wall
    /// clock as its timestamp. `correlation_id` and `signature` are left
    /// unset; callers thread a correlation id through explicitly when one
    /// is known, and the hub fills in a fresh one otherwise.
    pub fn new(
        source: ComponentName,
        target: ComponentId,
        message_type: impl Into<MessageType>,
        payload: serde_json::Value,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now_millis(),
            source,
            target,
            message_type: message_type.into(),
            payload,
            version: version.into(),
            correlation_id: None,
            signature: None,
        }
    }

    /// Returns the correlation id, falling back to the message id itself
    /// when none was supplied (the hub fills this in on ingress; this
    /// accessor lets call sites that build outbound messages rely on the
    /// same default without mutating the message first).
    pub fn effective_correlation_id(&self) -> Uuid {
        self.correlation_id.unwrap_or(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = Message {
            id: Uuid::new_v4(),
            timestamp: 0,
            source: ComponentName::parse("igor").unwrap(),
            target: ComponentId::parse("doctor").unwrap(),
            message_type: MessageType::new("plan.submit"),
            payload: serde_json::json!({"id": "p1"}),
            version: "2026-01-21-v11".to_owned(),
            correlation_id: None,
            signature: None,
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        assert!(!encoded.contains("correlationId"));
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.message_type, msg.message_type);
    }

    #[test]
    fn broadcast_target_round_trips() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "timestamp": 1,
            "source": "igor",
            "target": "broadcast",
            "type": "igor.exited",
            "payload": {},
            "version": "2026-01-21-v11",
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert!(msg.target.is_broadcast());
    }
}
