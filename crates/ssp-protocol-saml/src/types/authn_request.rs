//! SAML AuthnRequest types.
//!
//! Authentication request message sent by this service provider to the
//! identity provider.

use chrono::{DateTime, SubsecRound, Utc};

use super::{format_instant, parse_instant, NameIdFormat, SamlBinding, SAML_VERSION};
use crate::error::{SamlError, SamlResult};
use crate::xml::{self, escape, ns, ParseLimits};

/// Name ID policy of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameIdPolicy {
    /// Requested name ID format URI.
    pub format: Option<String>,
    /// Whether the IdP may create a new identifier.
    pub allow_create: bool,
}

/// SAML Authentication Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthnRequest {
    /// Unique identifier for this request (an NCName).
    pub id: String,
    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,
    /// The entity ID of the service provider issuing the request.
    pub issuer: String,
    /// The IdP endpoint the request is sent to.
    pub destination: String,
    /// The URL where the response should be sent.
    pub assertion_consumer_service_url: String,
    /// Binding the IdP should use for the response.
    pub protocol_binding: SamlBinding,
    /// Name ID policy constraints.
    pub name_id_policy: Option<NameIdPolicy>,
    /// Whether the IdP must authenticate the user directly.
    pub force_authn: bool,
    /// Whether the IdP must not interact with the user.
    pub is_passive: bool,
}

impl AuthnRequest {
    /// Creates a request with a fresh 160-bit identifier issued now.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        destination: impl Into<String>,
        acs_url: impl Into<String>,
    ) -> Self {
        Self {
            id: ssp_crypto::generate_message_id(),
            issue_instant: Utc::now().trunc_subsecs(0),
            issuer: issuer.into(),
            destination: destination.into(),
            assertion_consumer_service_url: acs_url.into(),
            protocol_binding: SamlBinding::HttpPost,
            name_id_policy: None,
            force_authn: false,
            is_passive: false,
        }
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_format(mut self, format: NameIdFormat) -> Self {
        self.name_id_policy = Some(NameIdPolicy {
            format: Some(format.uri().to_string()),
            allow_create: true,
        });
        self
    }

    /// Requires the IdP to re-authenticate the user.
    #[must_use]
    pub fn with_force_authn(mut self, force_authn: bool) -> Self {
        self.force_authn = force_authn;
        self
    }

    /// Requests passive authentication.
    #[must_use]
    pub fn with_is_passive(mut self, is_passive: bool) -> Self {
        self.is_passive = is_passive;
        self
    }

    /// Renders the request as XML.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut flags = String::new();
        if self.force_authn {
            flags.push_str(r#" ForceAuthn="true""#);
        }
        if self.is_passive {
            flags.push_str(r#" IsPassive="true""#);
        }

        let policy = self
            .name_id_policy
            .as_ref()
            .map(|p| {
                let format = p
                    .format
                    .as_deref()
                    .map(|f| format!(r#" Format="{}""#, escape(f)))
                    .unwrap_or_default();
                format!(
                    r#"<samlp:NameIDPolicy{format} AllowCreate="{}"/>"#,
                    p.allow_create
                )
            })
            .unwrap_or_default();

        format!(
            r#"<samlp:AuthnRequest xmlns:samlp="{samlp}" xmlns:saml="{saml}" ID="{id}" Version="{version}" IssueInstant="{instant}" Destination="{destination}" AssertionConsumerServiceURL="{acs}" ProtocolBinding="{binding}"{flags}><saml:Issuer>{issuer}</saml:Issuer>{policy}</samlp:AuthnRequest>"#,
            samlp = ns::SAMLP,
            saml = ns::SAML,
            id = escape(&self.id),
            version = SAML_VERSION,
            instant = format_instant(&self.issue_instant),
            destination = escape(&self.destination),
            acs = escape(&self.assertion_consumer_service_url),
            binding = self.protocol_binding.uri(),
            issuer = escape(&self.issuer),
        )
    }

    /// Parses a request, for example one decoded from a redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed or not an AuthnRequest.
    pub fn from_xml(input: &str) -> SamlResult<Self> {
        let doc = xml::parse_document(input, &ParseLimits::default())?;
        let root = doc.root_element();
        if !xml::is_element(root, ns::SAMLP, "AuthnRequest") {
            return Err(SamlError::XmlParse(format!(
                "expected samlp:AuthnRequest, found {}",
                root.tag_name().name()
            )));
        }

        let binding = root
            .attribute("ProtocolBinding")
            .map_or(Some(SamlBinding::HttpPost), SamlBinding::from_uri)
            .ok_or_else(|| SamlError::UnsupportedBinding("ProtocolBinding".to_string()))?;
        let name_id_policy = xml::child(root, ns::SAMLP, "NameIDPolicy").map(|p| NameIdPolicy {
            format: p.attribute("Format").map(str::to_string),
            allow_create: p.attribute("AllowCreate") == Some("true"),
        });
        let flag = |name: &str| matches!(root.attribute(name), Some("true" | "1"));

        Ok(Self {
            id: xml::require_attribute(root, "ID")?.to_string(),
            issue_instant: parse_instant(xml::require_attribute(root, "IssueInstant")?)?,
            issuer: xml::text_content(xml::require_child(root, ns::SAML, "Issuer")?),
            destination: root.attribute("Destination").unwrap_or_default().to_string(),
            assertion_consumer_service_url: root
                .attribute("AssertionConsumerServiceURL")
                .unwrap_or_default()
                .to_string(),
            protocol_binding: binding,
            name_id_policy,
            force_authn: flag("ForceAuthn"),
            is_passive: flag("IsPassive"),
        })
    }
}
