//! The polymorphic "component id" as a tagged variant rather than a raw
//! string: either a named, syntactically valid component, or the
//! distinguished `broadcast` sentinel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of a component name, in bytes.
pub const MAX_COMPONENT_NAME_LEN: usize = 128;

/// The wire spelling of the broadcast sentinel.
pub const BROADCAST_LITERAL: &str = "broadcast";

/// Error returned when a component-id string fails the syntax check in
/// [`ComponentName::parse`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ComponentNameError {
    /// The name was empty.
    #[error("component name must not be empty")]
    Empty,
    /// The name exceeded [`MAX_COMPONENT_NAME_LEN`].
    #[error("component name exceeds {MAX_COMPONENT_NAME_LEN} bytes")]
    TooLong,
    /// The name contained a byte outside `[A-Za-z0-9._-]`.
    #[error("component name contains an invalid character: {0:?}")]
    InvalidChar(char),
}

/// A validated, non-broadcast component name.
///
/// Names are ASCII, non-empty, at most [`MAX_COMPONENT_NAME_LEN`] bytes, and
/// restricted to `[A-Za-z0-9._-]` so they can be used unescaped in log lines,
/// file names (report/screenshot paths), and metric labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentName(String);

impl ComponentName {
    /// Parses and validates a component name.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ComponentNameError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ComponentNameError::Empty);
        }
        if raw.len() > MAX_COMPONENT_NAME_LEN {
            return Err(ComponentNameError::TooLong);
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(ComponentNameError::InvalidChar(bad));
        }
        Ok(Self(raw))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ComponentName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ComponentName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ComponentName::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// A message target: either a specific, named component or the `broadcast`
/// sentinel meaning "every other registered component".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentId {
    /// A single, addressable component.
    Named(ComponentName),
    /// The distinguished broadcast target.
    Broadcast,
}

impl ComponentId {
    /// Parses a component-id string, recognizing [`BROADCAST_LITERAL`] as
    /// [`ComponentId::Broadcast`].
    pub fn parse(raw: impl Into<String>) -> Result<Self, ComponentNameError> {
        let raw = raw.into();
        if raw == BROADCAST_LITERAL {
            Ok(ComponentId::Broadcast)
        } else {
            ComponentName::parse(raw).map(ComponentId::Named)
        }
    }

    /// Returns `true` if this is the broadcast sentinel.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, ComponentId::Broadcast)
    }

    /// Returns the underlying [`ComponentName`], if this is not broadcast.
    pub fn as_name(&self) -> Option<&ComponentName> {
        match self {
            ComponentId::Named(name) => Some(name),
            ComponentId::Broadcast => None,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Named(name) => name.fmt(f),
            ComponentId::Broadcast => f.write_str(BROADCAST_LITERAL),
        }
    }
}

impl Serialize for ComponentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ComponentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ComponentId::parse(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_parses_to_sentinel() {
        assert_eq!(ComponentId::parse("broadcast").unwrap(), ComponentId::Broadcast);
    }

    #[test]
    fn named_round_trips() {
        let id = ComponentId::parse("doctor-1").unwrap();
        assert_eq!(id.to_string(), "doctor-1");
        assert!(!id.is_broadcast());
    }

    #[test]
    fn rejects_empty_and_invalid_chars() {
        assert_eq!(ComponentName::parse(""), Err(ComponentNameError::Empty));
        assert_eq!(
            ComponentName::parse("bad id"),
            Err(ComponentNameError::InvalidChar(' '))
        );
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "a".repeat(MAX_COMPONENT_NAME_LEN + 1);
        assert_eq!(ComponentName::parse(long), Err(ComponentNameError::TooLong));
    }
}
