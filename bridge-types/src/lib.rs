#![deny(missing_docs)]
//! Shared message schema, component addressing, and signing primitives for
//! the bridge cluster.
//!
//! This crate groups together the strongly-typed values exchanged between
//! the hub, the worker face, and their supervised children:
//!
//! * [`component`] — the closed addressing scheme ([`component::ComponentId`])
//!   used as `source`/`target` on every [`message::Message`].
//! * [`message`] — the wire [`message::Message`] envelope itself.
//! * [`wire`] — the dot-notation message-type vocabulary the router treats
//!   specially.
//! * [`signing`] — canonical encoding and HMAC signing/verification.
//! * [`version`] — sender/hub version compatibility checks.
//! * [`plan`] — the `Plan`/`Step` payload shapes submitted to a worker face.
//! * [`report`] — report and screenshot submission payload shapes.
//!
//! Nothing in this crate talks to a socket or a filesystem; it only defines
//! the shapes and invariants that `bridge-hub` and `bridge-worker` share.

pub mod component;
pub mod message;
pub mod plan;
pub mod report;
pub mod signing;
pub mod version;
pub mod wire;

pub use component::ComponentId;
pub use message::Message;
