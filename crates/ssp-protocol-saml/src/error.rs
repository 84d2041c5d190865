//! SAML error types.
//!
//! Every failure of the engine maps to exactly one [`ErrorKind`]. The HTTP
//! layer renders per-request failures through [`SamlFailure`]; configuration
//! problems found at startup carry a [`ConfigurationError`] whose remediation
//! text is meant to be shown to an operator verbatim.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Machine readable classification of a [`SamlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Startup configuration is missing or inconsistent.
    Configuration,
    /// IdP metadata could not be retrieved.
    MetadataFetch,
    /// Metadata document is malformed or incomplete.
    MetadataParse,
    /// Transport encoding (base64, deflate, URL) is invalid.
    Decoding,
    /// XML is malformed, too large, or structurally wrong.
    XmlParse,
    /// An XML or query string signature did not verify.
    SignatureVerification,
    /// The IdP answered with a non-success status.
    AssertionRejected,
    /// An assertion is outside its validity window.
    ExpiredAssertion,
    /// The SP is not in the audience restriction.
    AudienceMismatch,
    /// The message was not issued by the configured IdP.
    IssuerMismatch,
    /// The message was addressed to another endpoint.
    InvalidDestination,
    /// The response does not answer a request this SP issued.
    UnsolicitedResponse,
    /// The binding is not offered by the peer.
    UnsupportedBinding,
    /// A protocol feature this SP does not implement.
    Unsupported,
    /// Key handling or signing failed.
    Crypto,
}

impl ErrorKind {
    /// Returns the snake case name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::MetadataFetch => "metadata_fetch",
            Self::MetadataParse => "metadata_parse",
            Self::Decoding => "decoding",
            Self::XmlParse => "xml_parse",
            Self::SignatureVerification => "signature_verification",
            Self::AssertionRejected => "assertion_rejected",
            Self::ExpiredAssertion => "expired_assertion",
            Self::AudienceMismatch => "audience_mismatch",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::InvalidDestination => "invalid_destination",
            Self::UnsolicitedResponse => "unsolicited_response",
            Self::UnsupportedBinding => "unsupported_binding",
            Self::Unsupported => "unsupported",
            Self::Crypto => "crypto",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What part of the configuration is wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigErrorKind {
    /// The SP private key file does not exist or cannot be read.
    MissingKeyFile,
    /// The SP certificate file does not exist or cannot be read.
    MissingCertificateFile,
    /// Key or certificate bytes could not be parsed.
    InvalidKeyMaterial,
    /// No IdP metadata source is configured.
    NoIdpSource,
    /// More than one IdP metadata source is configured.
    MultipleIdpSources,
    /// Manual IdP configuration lacks a required field.
    IncompleteManualIdp,
    /// The configured IdP metadata file does not exist.
    MissingMetadataFile,
    /// A configuration value has the wrong shape.
    InvalidValue,
}

/// A configuration problem together with how to fix it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    /// Classification.
    pub kind: ConfigErrorKind,
    /// What is wrong.
    pub message: String,
    /// How to fix it, if there is a known recipe.
    pub remediation: Option<String>,
}

impl ConfigurationError {
    /// Creates a configuration error without remediation text.
    #[must_use]
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remediation: None,
        }
    }

    /// Attaches remediation text.
    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigurationError {}

impl From<ConfigurationError> for SamlError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(ConfigurationError),

    /// Metadata could not be retrieved.
    #[error("failed to fetch metadata from {source_name}: {reason}")]
    MetadataFetch {
        /// URL or path of the metadata source.
        source_name: String,
        /// Upstream cause.
        reason: String,
    },

    /// Metadata is malformed or incomplete.
    #[error("invalid metadata: {0}")]
    MetadataParse(String),

    /// Base64, deflate or URL decoding failed.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// XML signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// The IdP returned a non-success status.
    #[error("authentication rejected by identity provider: {status}")]
    AssertionRejected {
        /// Top level status code URI.
        status: String,
        /// Second level status code URI.
        sub_status: Option<String>,
        /// Human readable status message.
        message: Option<String>,
    },

    /// Assertion expired or not yet valid.
    #[error("assertion outside its validity window: {0}")]
    AssertionExpired(String),

    /// Invalid audience.
    #[error("invalid audience: expected {expected}, got {actual}")]
    InvalidAudience {
        /// The expected audience URI.
        expected: String,
        /// The actual audience URI(s).
        actual: String,
    },

    /// Invalid issuer.
    #[error("invalid issuer: expected {expected}, got {actual}")]
    InvalidIssuer {
        /// The expected issuer.
        expected: String,
        /// The actual issuer.
        actual: String,
    },

    /// Invalid destination.
    #[error("invalid destination: expected {expected}, got {actual}")]
    InvalidDestination {
        /// The expected destination URL.
        expected: String,
        /// The actual destination URL.
        actual: String,
    },

    /// Response does not correlate with an outstanding request.
    #[error("unsolicited response: {0}")]
    UnsolicitedResponse(String),

    /// Unknown or unsupported binding.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Protocol feature that is deliberately not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl SamlError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::MetadataFetch { .. } => ErrorKind::MetadataFetch,
            Self::MetadataParse(_) => ErrorKind::MetadataParse,
            Self::Decoding(_) => ErrorKind::Decoding,
            Self::XmlParse(_) | Self::MissingElement(_) => ErrorKind::XmlParse,
            Self::SignatureInvalid(_) => ErrorKind::SignatureVerification,
            Self::AssertionRejected { .. } => ErrorKind::AssertionRejected,
            Self::AssertionExpired(_) => ErrorKind::ExpiredAssertion,
            Self::InvalidAudience { .. } => ErrorKind::AudienceMismatch,
            Self::InvalidIssuer { .. } => ErrorKind::IssuerMismatch,
            Self::InvalidDestination { .. } => ErrorKind::InvalidDestination,
            Self::UnsolicitedResponse(_) => ErrorKind::UnsolicitedResponse,
            Self::UnsupportedBinding(_) => ErrorKind::UnsupportedBinding,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Crypto(_) => ErrorKind::Crypto,
        }
    }

    /// Returns the remediation text of a configuration error.
    #[must_use]
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::Configuration(err) => err.remediation.as_deref(),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Decoding(_) | Self::XmlParse(_) | Self::MissingElement(_) => 400,
            Self::SignatureInvalid(_)
            | Self::AssertionRejected { .. }
            | Self::AssertionExpired(_)
            | Self::InvalidAudience { .. }
            | Self::InvalidIssuer { .. }
            | Self::InvalidDestination { .. }
            | Self::UnsolicitedResponse(_) => 401,
            Self::UnsupportedBinding(_) | Self::Unsupported(_) => 501,
            Self::MetadataFetch { .. } => 502,
            _ => 500,
        }
    }

    /// Builds the structured failure shown to the user.
    ///
    /// `detail` is raw message context (for example the decoded XML). It is
    /// only retained when `debug` is set; the outcome of validation is the
    /// same either way.
    #[must_use]
    pub fn to_failure(&self, detail: Option<&str>, debug: bool) -> SamlFailure {
        SamlFailure {
            kind: self.kind(),
            message: self.to_string(),
            remediation: self.remediation().map(ToOwned::to_owned),
            detail: detail.filter(|_| debug).map(ToOwned::to_owned),
        }
    }
}

/// Structured description of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamlFailure {
    /// Classification.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
    /// Operator remediation, for configuration errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Raw message context, only present in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decoding(format!("invalid base64: {err}"))
    }
}

impl From<roxmltree::Error> for SamlError {
    fn from(err: roxmltree::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<ssp_crypto::SignatureError> for SamlError {
    fn from(err: ssp_crypto::SignatureError) -> Self {
        Self::Crypto(err.to_string())
    }
}
