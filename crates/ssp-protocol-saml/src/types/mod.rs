//! SAML 2.0 message types.
//!
//! Inbound messages are built from an already verified `roxmltree` DOM;
//! outbound messages render themselves to XML.

mod assertion;
mod authn_request;
mod constants;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};

/// Parses an `xs:dateTime` as used by SAML (always UTC in practice).
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] if the value is not an RFC 3339 instant.
pub fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::XmlParse(format!("invalid timestamp {value:?}: {e}")))
}

/// Parses an optional `xs:dateTime` attribute.
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] if the value is present but malformed.
pub fn parse_optional_instant(value: Option<&str>) -> SamlResult<Option<DateTime<Utc>>> {
    value.map(parse_instant).transpose()
}

/// Formats an instant the way SAML messages carry it.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn instants_round_trip() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let formatted = format_instant(&instant);
        assert_eq!(formatted, "2024-05-01T12:30:00Z");
        assert_eq!(parse_instant(&formatted).unwrap(), instant);
    }

    #[test]
    fn fractional_and_offset_instants_parse() {
        let parsed = parse_instant("2024-05-01T14:30:00.123+02:00").unwrap();
        assert_eq!(format_instant(&parsed), "2024-05-01T12:30:00.123Z");
    }

    #[test]
    fn malformed_instant_is_rejected() {
        assert!(parse_instant("yesterday").is_err());
        assert!(parse_optional_instant(None).unwrap().is_none());
    }
}
