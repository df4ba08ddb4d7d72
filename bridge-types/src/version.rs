//! Version compatibility between a sender's declared version and the hub's
//! `MIN_COMPATIBLE_VERSION`.
//!
//! The sender's version string must parse as an ISO date and compare `>=`
//! the hub's configured minimum. Versions in the wild embed a trailing build
//! suffix after the date (e.g. `2026-01-21-v11`), so only the leading
//! `YYYY-MM-DD` prefix is parsed and anything after it is ignored (see
//! DESIGN.md).

use chrono::NaiveDate;

/// Errors produced while checking version compatibility.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    /// The version string had no parseable leading `YYYY-MM-DD` date.
    #[error("version {0:?} does not start with a YYYY-MM-DD date")]
    Unparseable(String),
}

/// Extracts the leading `YYYY-MM-DD` date from a version string such as
/// `2026-01-21-v11`, ignoring any trailing build metadata.
fn leading_date(version: &str) -> Result<NaiveDate, VersionError> {
    let prefix: String = version.chars().take(10).collect();
    NaiveDate::parse_from_str(&prefix, "%Y-%m-%d")
        .map_err(|_| VersionError::Unparseable(version.to_owned()))
}

/// Returns `Ok(true)` iff `sender_version`'s leading date is greater than or
/// equal to `min_compatible_version`'s leading date.
///
/// An unparseable version is treated as incompatible (`Ok(false)`) rather
/// than propagated as an error, so callers on the hot
/// path (`component.register` handling) can treat this as a plain bool and
/// kick the connection; the [`VersionError`] is exposed for callers that do
/// want to distinguish "too old" from "malformed".
pub fn is_compatible(sender_version: &str, min_compatible_version: &str) -> bool {
    match (leading_date(sender_version), leading_date(min_compatible_version)) {
        (Ok(sender), Ok(min)) => sender >= min,
        _ => false,
    }
}

/// Same as [`is_compatible`] but surfaces a [`VersionError`] when either
/// version string itself is malformed, rather than collapsing that into
/// `false`.
pub fn check_compatible(
    sender_version: &str,
    min_compatible_version: &str,
) -> Result<bool, VersionError> {
    let sender = leading_date(sender_version)?;
    let min = leading_date(min_compatible_version)?;
    Ok(sender >= min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_version_is_compatible() {
        assert!(is_compatible("2026-01-21-v11", "2025-01-01"));
    }

    #[test]
    fn older_version_is_incompatible() {
        assert!(!is_compatible("2024-01-01-v1", "2025-01-01"));
    }

    #[test]
    fn equal_dates_are_compatible() {
        assert!(is_compatible("2025-01-01-v9", "2025-01-01"));
    }

    #[test]
    fn malformed_version_is_incompatible() {
        assert!(!is_compatible("not-a-version", "2025-01-01"));
        assert_eq!(
            check_compatible("not-a-version", "2025-01-01"),
            Err(VersionError::Unparseable("not-a-version".to_owned()))
        );
    }
}
