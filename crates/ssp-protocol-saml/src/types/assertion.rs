//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer. They are
//! read from a DOM node that the validator has already verified, so parsing
//! here is purely structural.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use roxmltree::Node;

use super::{confirmation_methods, parse_instant, parse_optional_instant};
use crate::error::{SamlError, SamlResult};
use crate::xml::{self, ns};

/// SAML Assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,
    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,
    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,
    /// The subject of this assertion.
    pub subject: Subject,
    /// Conditions that must be evaluated for the assertion to be valid.
    pub conditions: Option<Conditions>,
    /// Authentication statement describing how the subject authenticated.
    pub authn_statement: Option<AuthnStatement>,
    /// Attribute values by attribute name, in document order.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Whether a `ds:Signature` is embedded in this assertion.
    pub has_signature: bool,
}

impl Assertion {
    /// Reads a `saml:Assertion` element.
    ///
    /// # Errors
    ///
    /// Returns an error if required elements or attributes are missing or a
    /// timestamp is malformed.
    pub fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        let version = xml::require_attribute(node, "Version")?;
        if version != super::SAML_VERSION {
            return Err(SamlError::XmlParse(format!(
                "unsupported assertion version {version}"
            )));
        }

        let issuer = xml::text_content(xml::require_child(node, ns::SAML, "Issuer")?);
        let subject = Subject::from_element(xml::require_child(node, ns::SAML, "Subject")?)?;
        let conditions = xml::child(node, ns::SAML, "Conditions")
            .map(Conditions::from_element)
            .transpose()?;
        let authn_statement = xml::child(node, ns::SAML, "AuthnStatement")
            .map(AuthnStatement::from_element)
            .transpose()?;

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for statement in xml::children(node, ns::SAML, "AttributeStatement") {
            if xml::child(statement, ns::SAML, "EncryptedAttribute").is_some() {
                return Err(SamlError::Unsupported("encrypted attributes".to_string()));
            }
            for attribute in xml::children(statement, ns::SAML, "Attribute") {
                let name = xml::require_attribute(attribute, "Name")?;
                let values = attributes.entry(name.to_string()).or_default();
                values.extend(
                    xml::children(attribute, ns::SAML, "AttributeValue").map(xml::text_content),
                );
            }
        }

        Ok(Self {
            id: xml::require_attribute(node, "ID")?.to_string(),
            issue_instant: parse_instant(xml::require_attribute(node, "IssueInstant")?)?,
            issuer,
            subject,
            conditions,
            authn_statement,
            attributes,
            has_signature: xml::child(node, ns::DS, "Signature").is_some(),
        })
    }

    /// Returns the `SessionIndex` of the authentication statement.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.authn_statement
            .as_ref()
            .and_then(|s| s.session_index.as_deref())
    }

    /// Returns the bearer subject confirmations.
    pub fn bearer_confirmations(&self) -> impl Iterator<Item = &SubjectConfirmation> {
        self.subject
            .confirmations
            .iter()
            .filter(|c| c.method == confirmation_methods::BEARER)
    }
}

/// Name identifier of a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameId {
    /// The identifier value.
    pub value: String,
    /// Format URI, if given.
    pub format: Option<String>,
}

/// Subject of an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// The subject's name identifier.
    pub name_id: Option<NameId>,
    /// How the subject can be confirmed.
    pub confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        if xml::child(node, ns::SAML, "EncryptedID").is_some() {
            return Err(SamlError::Unsupported("encrypted name identifiers".to_string()));
        }

        let name_id = xml::child(node, ns::SAML, "NameID").map(|n| NameId {
            value: xml::text_content(n),
            format: n.attribute("Format").map(str::to_string),
        });

        let confirmations = xml::children(node, ns::SAML, "SubjectConfirmation")
            .map(SubjectConfirmation::from_element)
            .collect::<SamlResult<Vec<_>>>()?;

        Ok(Self {
            name_id,
            confirmations,
        })
    }
}

/// A `SubjectConfirmation` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectConfirmation {
    /// Confirmation method URI.
    pub method: String,
    /// Start of validity.
    pub not_before: Option<DateTime<Utc>>,
    /// End of validity (exclusive).
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Where the assertion may be presented.
    pub recipient: Option<String>,
    /// ID of the request this confirms.
    pub in_response_to: Option<String>,
}

impl SubjectConfirmation {
    fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        let method = xml::require_attribute(node, "Method")?.to_string();
        let data = xml::child(node, ns::SAML, "SubjectConfirmationData");
        let attr = |name: &str| data.and_then(|d| d.attribute(name));

        Ok(Self {
            method,
            not_before: parse_optional_instant(attr("NotBefore"))?,
            not_on_or_after: parse_optional_instant(attr("NotOnOrAfter"))?,
            recipient: attr("Recipient").map(str::to_string),
            in_response_to: attr("InResponseTo").map(str::to_string),
        })
    }
}

/// Assertion conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    /// Start of validity.
    pub not_before: Option<DateTime<Utc>>,
    /// End of validity (exclusive).
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// One entry per `AudienceRestriction`, each listing its audiences.
    pub audience_restrictions: Vec<Vec<String>>,
}

impl Conditions {
    fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        let audience_restrictions = xml::children(node, ns::SAML, "AudienceRestriction")
            .map(|restriction| {
                xml::children(restriction, ns::SAML, "Audience")
                    .map(xml::text_content)
                    .collect()
            })
            .collect();

        Ok(Self {
            not_before: parse_optional_instant(node.attribute("NotBefore"))?,
            not_on_or_after: parse_optional_instant(node.attribute("NotOnOrAfter"))?,
            audience_restrictions,
        })
    }

    /// Checks the validity window against `now`, tolerating `skew`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::AssertionExpired`] if `now` is before
    /// `NotBefore - skew` or at/after `NotOnOrAfter + skew`.
    pub fn check_validity(&self, now: DateTime<Utc>, skew: Duration) -> SamlResult<()> {
        check_window(self.not_before, self.not_on_or_after, now, skew, "assertion")
    }

    /// Checks that every audience restriction names `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidAudience`] if there is no restriction or
    /// any restriction omits `entity_id`.
    pub fn check_audience(&self, entity_id: &str) -> SamlResult<()> {
        if self.audience_restrictions.is_empty() {
            return Err(SamlError::InvalidAudience {
                expected: entity_id.to_string(),
                actual: "no audience restriction".to_string(),
            });
        }
        for audiences in &self.audience_restrictions {
            if !audiences.iter().any(|a| a == entity_id) {
                return Err(SamlError::InvalidAudience {
                    expected: entity_id.to_string(),
                    actual: audiences.join(", "),
                });
            }
        }
        Ok(())
    }
}

/// Checks a `[not_before, not_on_or_after)` window with clock skew.
///
/// # Errors
///
/// Returns [`SamlError::AssertionExpired`] naming `what` when outside.
pub fn check_window(
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    skew: Duration,
    what: &str,
) -> SamlResult<()> {
    // A skew that overflows the calendar leaves that edge of the window open.
    if let Some(not_before) = not_before {
        if now.checked_add_signed(skew).is_some_and(|latest| latest < not_before) {
            return Err(SamlError::AssertionExpired(format!(
                "{what} not valid before {not_before}"
            )));
        }
    }
    if let Some(not_on_or_after) = not_on_or_after {
        if now
            .checked_sub_signed(skew)
            .is_some_and(|earliest| earliest >= not_on_or_after)
        {
            return Err(SamlError::AssertionExpired(format!(
                "{what} expired at {not_on_or_after}"
            )));
        }
    }
    Ok(())
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnStatement {
    /// When the subject authenticated.
    pub authn_instant: DateTime<Utc>,
    /// IdP session identifier.
    pub session_index: Option<String>,
    /// When the IdP session ends.
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// Authentication context class reference.
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        let authn_context_class_ref = xml::child(node, ns::SAML, "AuthnContext")
            .and_then(|ctx| xml::child(ctx, ns::SAML, "AuthnContextClassRef"))
            .map(xml::text_content);

        Ok(Self {
            authn_instant: parse_instant(xml::require_attribute(node, "AuthnInstant")?)?,
            session_index: node.attribute("SessionIndex").map(str::to_string),
            session_not_on_or_after: parse_optional_instant(
                node.attribute("SessionNotOnOrAfter"),
            )?,
            authn_context_class_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_document, ParseLimits};
    use chrono::TimeZone;

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">user@example.com</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData NotOnOrAfter="2024-01-01T00:05:00Z" Recipient="https://sp.example.com/acs" InResponseTo="_req"/>
    </saml:SubjectConfirmation>
  </saml:Subject>
  <saml:Conditions NotBefore="2024-01-01T00:00:00Z" NotOnOrAfter="2024-01-01T00:05:00Z">
    <saml:AudienceRestriction><saml:Audience>https://sp.example.com/metadata</saml:Audience></saml:AudienceRestriction>
  </saml:Conditions>
  <saml:AuthnStatement AuthnInstant="2024-01-01T00:00:00Z" SessionIndex="_s1">
    <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></saml:AuthnContext>
  </saml:AuthnStatement>
  <saml:AttributeStatement>
    <saml:Attribute Name="role"><saml:AttributeValue>admin</saml:AttributeValue><saml:AttributeValue>user</saml:AttributeValue></saml:Attribute>
    <saml:Attribute Name="email"><saml:AttributeValue>user@example.com</saml:AttributeValue></saml:Attribute>
  </saml:AttributeStatement>
</saml:Assertion>"#;

    fn parse() -> Assertion {
        let doc = parse_document(ASSERTION, &ParseLimits::default()).unwrap();
        Assertion::from_element(doc.root_element()).unwrap()
    }

    #[test]
    fn parses_full_assertion() {
        let assertion = parse();
        assert_eq!(assertion.id, "_a1");
        assert_eq!(assertion.issuer, "https://idp.example.com");
        assert_eq!(
            assertion.subject.name_id.as_ref().map(|n| n.value.as_str()),
            Some("user@example.com")
        );
        assert_eq!(assertion.session_index(), Some("_s1"));
        assert_eq!(assertion.attributes["role"], vec!["admin", "user"]);
        assert!(!assertion.has_signature);

        let bearer: Vec<_> = assertion.bearer_confirmations().collect();
        assert_eq!(bearer.len(), 1);
        assert_eq!(bearer[0].in_response_to.as_deref(), Some("_req"));
    }

    #[test]
    fn validity_window_with_skew() {
        let conditions = parse().conditions.unwrap();
        let inside = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 30).unwrap();

        assert!(conditions.check_validity(inside, Duration::zero()).is_ok());
        assert!(matches!(
            conditions.check_validity(after, Duration::zero()),
            Err(SamlError::AssertionExpired(_))
        ));
        assert!(conditions.check_validity(after, Duration::seconds(60)).is_ok());
        assert!(conditions.check_validity(before, Duration::zero()).is_err());
        assert!(conditions.check_validity(before, Duration::seconds(30)).is_ok());
    }

    #[test]
    fn skew_beyond_the_calendar_opens_the_window() {
        let conditions = parse().conditions.unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        let huge = Duration::try_seconds(10_000_000_000_000).unwrap();

        assert!(conditions.check_validity(now, huge).is_ok());
        assert!(check_window(None, None, now, huge, "assertion").is_ok());
    }

    #[test]
    fn audience_must_be_listed_in_every_restriction() {
        let mut conditions = parse().conditions.unwrap();
        assert!(conditions.check_audience("https://sp.example.com/metadata").is_ok());
        assert!(matches!(
            conditions.check_audience("https://other.example.com"),
            Err(SamlError::InvalidAudience { .. })
        ));

        conditions.audience_restrictions.push(vec!["https://other.example.com".to_string()]);
        assert!(conditions.check_audience("https://sp.example.com/metadata").is_err());

        conditions.audience_restrictions.clear();
        assert!(conditions.check_audience("https://sp.example.com/metadata").is_err());
    }
}
