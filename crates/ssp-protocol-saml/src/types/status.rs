//! SAML Status types.

use roxmltree::Node;

use crate::error::SamlResult;
use crate::xml::{self, ns};

/// Top-level SAML status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    /// The request succeeded.
    Success,
    /// The request could not be performed due to an error on the part of the requester.
    Requester,
    /// The request could not be performed due to an error on the part of the responder.
    Responder,
    /// The SAML responder could not process the request because the version was incorrect.
    VersionMismatch,
    /// A code outside the four defined top-level values, kept verbatim.
    Other(String),
}

impl StatusCode {
    /// Returns the URI for this status code.
    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Success => "urn:oasis:names:tc:SAML:2.0:status:Success",
            Self::Requester => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            Self::Responder => "urn:oasis:names:tc:SAML:2.0:status:Responder",
            Self::VersionMismatch => "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch",
            Self::Other(uri) => uri,
        }
    }

    /// Parses a status code URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            "urn:oasis:names:tc:SAML:2.0:status:Success" => Self::Success,
            "urn:oasis:names:tc:SAML:2.0:status:Requester" => Self::Requester,
            "urn:oasis:names:tc:SAML:2.0:status:Responder" => Self::Responder,
            "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch" => Self::VersionMismatch,
            other => Self::Other(other.to_string()),
        }
    }
}

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Top-level status code.
    pub code: StatusCode,
    /// Second-level status code URI, e.g. `...:status:AuthnFailed`.
    pub sub_code: Option<String>,
    /// Optional status message.
    pub message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            sub_code: None,
            message: None,
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// Reads a `samlp:Status` element.
    ///
    /// # Errors
    ///
    /// Returns an error if `StatusCode` or its `Value` is missing.
    pub fn from_element(node: Node<'_, '_>) -> SamlResult<Self> {
        let code_node = xml::require_child(node, ns::SAMLP, "StatusCode")?;
        let code = StatusCode::from_uri(xml::require_attribute(code_node, "Value")?);
        let sub_code = xml::child(code_node, ns::SAMLP, "StatusCode")
            .and_then(|n| n.attribute("Value"))
            .map(str::to_string);
        let message = xml::child(node, ns::SAMLP, "StatusMessage")
            .map(xml::text_content)
            .filter(|m| !m.is_empty());

        Ok(Self {
            code,
            sub_code,
            message,
        })
    }
}
