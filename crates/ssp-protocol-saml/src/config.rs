//! Service provider settings shared by the request builder, the metadata
//! generator and the response validator.

use chrono::Duration;
use ssp_crypto::SignatureAlgorithm;

use crate::types::NameIdFormat;
use crate::xml::ParseLimits;

/// Static configuration of this service provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProviderConfig {
    /// SP entity ID, also the expected audience.
    pub entity_id: String,
    /// Assertion consumer service URL (HTTP-POST).
    pub acs_url: String,
    /// Single logout URL (HTTP-Redirect), published in metadata only.
    pub slo_url: Option<String>,
    /// Sign outgoing AuthnRequests.
    pub authn_requests_signed: bool,
    /// Advertise `WantAssertionsSigned` in SP metadata. Assertions are
    /// always required to be covered by their own or the Response's
    /// signature.
    pub want_assertions_signed: bool,
    /// NameID format requested in AuthnRequests.
    pub name_id_format: Option<NameIdFormat>,
    /// Algorithm used for AuthnRequest signatures.
    pub signature_algorithm: SignatureAlgorithm,
    /// Tolerated clock difference with the IdP.
    pub clock_skew: Duration,
    /// Accept SHA-1 based signatures from the IdP.
    pub allow_sha1: bool,
    /// Limits applied when parsing inbound messages.
    pub parse_limits: ParseLimits,
}

impl ServiceProviderConfig {
    /// Creates a configuration with signed requests, signed assertions
    /// required, RSA-SHA256 and no clock skew.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, acs_url: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            acs_url: acs_url.into(),
            slo_url: None,
            authn_requests_signed: true,
            want_assertions_signed: true,
            name_id_format: None,
            signature_algorithm: SignatureAlgorithm::RsaSha256,
            clock_skew: Duration::zero(),
            allow_sha1: false,
            parse_limits: ParseLimits::default(),
        }
    }

    /// Sets the single logout URL.
    #[must_use]
    pub fn with_slo_url(mut self, slo_url: impl Into<String>) -> Self {
        self.slo_url = Some(slo_url.into());
        self
    }

    /// Sets whether AuthnRequests are signed.
    #[must_use]
    pub fn with_authn_requests_signed(mut self, signed: bool) -> Self {
        self.authn_requests_signed = signed;
        self
    }

    /// Sets the `WantAssertionsSigned` metadata flag.
    #[must_use]
    pub fn with_want_assertions_signed(mut self, want: bool) -> Self {
        self.want_assertions_signed = want;
        self
    }

    /// Requests a NameID format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: NameIdFormat) -> Self {
        self.name_id_format = Some(format);
        self
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Accepts SHA-1 signatures and digests.
    #[must_use]
    pub fn with_allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Overrides the inbound parse limits.
    #[must_use]
    pub fn with_parse_limits(mut self, limits: ParseLimits) -> Self {
        self.parse_limits = limits;
        self
    }
}
