//! Projection of a validated identity into an authentication record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::validator::ValidatedIdentity;

/// An immutable record of a successful SAML login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    name_id: String,
    name_id_format: Option<String>,
    session_index: Option<String>,
    attributes: BTreeMap<String, Vec<String>>,
    issuer: String,
    not_on_or_after: Option<DateTime<Utc>>,
    authn_instant: Option<DateTime<Utc>>,
}

impl AuthenticatedSession {
    /// Subject NameID.
    #[must_use]
    pub fn name_id(&self) -> &str {
        &self.name_id
    }

    /// NameID format URI.
    #[must_use]
    pub fn name_id_format(&self) -> Option<&str> {
        self.name_id_format.as_deref()
    }

    /// IdP session index.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.session_index.as_deref()
    }

    /// Attributes released by the IdP.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }

    /// Values of one attribute, empty if absent.
    #[must_use]
    pub fn attribute(&self, name: &str) -> &[String] {
        self.attributes.get(name).map_or(&[], Vec::as_slice)
    }

    /// IdP entity ID.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// End of the assertion's validity.
    #[must_use]
    pub fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.not_on_or_after
    }

    /// When the user authenticated at the IdP.
    #[must_use]
    pub fn authn_instant(&self) -> Option<DateTime<Utc>> {
        self.authn_instant
    }
}

/// Maps a validated identity to a session record.
#[must_use]
pub fn project(identity: &ValidatedIdentity) -> AuthenticatedSession {
    AuthenticatedSession {
        name_id: identity.name_id.clone(),
        name_id_format: identity.name_id_format.clone(),
        session_index: identity.session_index.clone(),
        attributes: identity.attributes.clone(),
        issuer: identity.issuer.clone(),
        not_on_or_after: identity.not_on_or_after,
        authn_instant: identity.authn_instant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ValidatedIdentity {
        ValidatedIdentity {
            name_id: "user@example.com".to_string(),
            name_id_format: None,
            attributes: BTreeMap::from([("role".to_string(), vec!["admin".to_string()])]),
            session_index: Some("_s1".to_string()),
            not_on_or_after: None,
            issuer: "https://idp.example.com".to_string(),
            in_response_to: None,
            authn_instant: None,
        }
    }

    #[test]
    fn projection_copies_identity() {
        let session = project(&identity());
        assert_eq!(session.name_id(), "user@example.com");
        assert_eq!(session.session_index(), Some("_s1"));
        assert_eq!(session.attribute("role"), ["admin".to_string()]);
        assert!(session.attribute("missing").is_empty());
    }

    #[test]
    fn projection_is_deterministic() {
        let identity = identity();
        assert_eq!(project(&identity), project(&identity));
    }
}
