//! SAML Response type.

use chrono::{DateTime, Utc};
use roxmltree::Node;

use super::{parse_instant, Assertion, Status, SAML_VERSION};
use crate::error::{SamlError, SamlResult};
use crate::xml::{self, ns};

/// A `samlp:Response` as received at the assertion consumer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// ID of the request this responds to.
    pub in_response_to: Option<String>,
    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,
    /// Where the IdP sent the response.
    pub destination: Option<String>,
    /// Entity ID of the issuer (optional at the response level).
    pub issuer: Option<String>,
    /// Outcome reported by the IdP.
    pub status: Status,
    /// Assertions in document order.
    pub assertions: Vec<Assertion>,
    /// Whether a `ds:Signature` is embedded at the response level.
    pub has_signature: bool,
}

impl SamlResponse {
    /// Reads a `samlp:Response` element, including its assertions.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not a SAML 2.0 Response, required
    /// parts are missing, or it carries encrypted assertions.
    pub fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        Self::check_envelope(node)?;

        let assertions = xml::children(node, ns::SAML, "Assertion")
            .map(Assertion::from_element)
            .collect::<SamlResult<Vec<_>>>()?;

        Self::from_parts(node, assertions)
    }

    /// Reads only the response envelope; assertions are supplied by the
    /// caller (the validator parses each one after checking it).
    pub(crate) fn from_parts(node: Node<'_, '_>, assertions: Vec<Assertion>) -> SamlResult<Self> {
        Ok(Self {
            id: xml::require_attribute(node, "ID")?.to_string(),
            in_response_to: node.attribute("InResponseTo").map(str::to_string),
            issue_instant: parse_instant(xml::require_attribute(node, "IssueInstant")?)?,
            destination: node.attribute("Destination").map(str::to_string),
            issuer: xml::child(node, ns::SAML, "Issuer").map(xml::text_content),
            status: Status::from_element(xml::require_child(node, ns::SAMLP, "Status")?)?,
            assertions,
            has_signature: xml::child(node, ns::DS, "Signature").is_some(),
        })
    }

    /// Checks the root element name, version and the absence of encrypted
    /// assertions.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for a wrong root or version and
    /// [`SamlError::Unsupported`] for encrypted assertions.
    pub fn check_envelope(node: Node<'_, '_>) -> SamlResult<()> {
        if !xml::is_element(node, ns::SAMLP, "Response") {
            return Err(SamlError::XmlParse(format!(
                "expected samlp:Response, found {}",
                node.tag_name().name()
            )));
        }
        let version = xml::require_attribute(node, "Version")?;
        if version != SAML_VERSION {
            return Err(SamlError::XmlParse(format!("unsupported SAML version {version}")));
        }
        if xml::child(node, ns::SAML, "EncryptedAssertion").is_some() {
            return Err(SamlError::Unsupported("encrypted assertions".to_string()));
        }
        Ok(())
    }
}
