//! SAML bindings implementation.
//!
//! - **HTTP-POST Binding**: messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding**: messages are deflated, base64-encoded and
//!   URL-encoded into the query string, with an optional detached signature

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// AuthnRequest message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// Redirect binding signature, still base64 encoded.
    pub signature: Option<String>,
    /// Redirect binding signature algorithm URI.
    pub sig_alg: Option<String>,
    /// The exact query octets covered by the redirect signature.
    pub signed_content: Option<String>,
}
