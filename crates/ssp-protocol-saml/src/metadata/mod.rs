//! SAML 2.0 metadata.
//!
//! [`EntityDescriptor`] is the typed form of an `md:EntityDescriptor` for
//! either role. The IdP descriptor is parsed once at startup (see
//! [`IdpSource`]) and shared read-only; the SP descriptor is built from
//! [`ServiceProviderConfig`] and the SP credentials and served at
//! `/metadata`.

mod source;

use std::fmt::Write as _;

use roxmltree::Node;

use crate::config::ServiceProviderConfig;
use crate::credentials::{Certificate, SigningCredentials};
use crate::error::{SamlError, SamlResult};
use crate::types::{NameIdFormat, SamlBinding};
use crate::xml::{self, ns, ParseLimits};

pub use source::{IdpSource, DEFAULT_FETCH_TIMEOUT};

/// Metadata documents may be federation aggregates, so they get more room
/// than protocol messages.
pub const METADATA_PARSE_LIMITS: ParseLimits = ParseLimits {
    max_bytes: 8 * 1024 * 1024,
    max_depth: 64,
    max_nodes: 1_000_000,
};

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Binding URI, kept verbatim so unknown bindings survive a round trip.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
}

impl Endpoint {
    /// Creates an endpoint for a known binding.
    #[must_use]
    pub fn new(binding: SamlBinding, location: impl Into<String>) -> Self {
        Self {
            binding: binding.uri().to_string(),
            location: location.into(),
        }
    }

    /// Returns the binding if it is one this SP supports.
    #[must_use]
    pub fn saml_binding(&self) -> Option<SamlBinding> {
        SamlBinding::from_uri(&self.binding)
    }
}

/// Typed `md:EntityDescriptor`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// The `entityID`.
    pub entity_id: String,
    /// IdP single sign-on endpoints, in document order.
    pub sso_endpoints: Vec<Endpoint>,
    /// SP assertion consumer endpoints, in document order.
    pub acs_endpoints: Vec<Endpoint>,
    /// Single logout endpoints of either role.
    pub slo_endpoints: Vec<Endpoint>,
    /// Certificates usable for signature verification.
    pub signing_certificates: Vec<Certificate>,
    /// Advertised NameID format URIs.
    pub name_id_formats: Vec<String>,
    /// SP role: requests are signed.
    pub authn_requests_signed: bool,
    /// SP role: assertions must be signed.
    pub want_assertions_signed: bool,
    /// IdP role: requests must be signed.
    pub want_authn_requests_signed: bool,
}

impl EntityDescriptor {
    /// Builds the SP descriptor published at the metadata endpoint.
    #[must_use]
    pub fn service_provider(config: &ServiceProviderConfig, credentials: &SigningCredentials) -> Self {
        let name_id_formats = config
            .name_id_format
            .map(|f| vec![f.uri().to_string()])
            .unwrap_or_else(|| {
                [NameIdFormat::Email, NameIdFormat::Persistent, NameIdFormat::Transient]
                    .iter()
                    .map(|f| f.uri().to_string())
                    .collect()
            });

        Self {
            entity_id: config.entity_id.clone(),
            sso_endpoints: Vec::new(),
            acs_endpoints: vec![Endpoint::new(SamlBinding::HttpPost, &config.acs_url)],
            slo_endpoints: config
                .slo_url
                .iter()
                .map(|url| Endpoint::new(SamlBinding::HttpRedirect, url))
                .collect(),
            signing_certificates: vec![credentials.certificate().clone()],
            name_id_formats,
            authn_requests_signed: config.authn_requests_signed,
            want_assertions_signed: config.want_assertions_signed,
            want_authn_requests_signed: false,
        }
    }

    /// Builds an IdP descriptor from manually configured values. The SSO URL
    /// is registered for both the Redirect and the POST binding.
    #[must_use]
    pub fn manual_idp(
        entity_id: impl Into<String>,
        sso_url: impl Into<String>,
        certificate: Certificate,
    ) -> Self {
        let sso_url = sso_url.into();
        Self {
            entity_id: entity_id.into(),
            sso_endpoints: vec![
                Endpoint::new(SamlBinding::HttpRedirect, sso_url.clone()),
                Endpoint::new(SamlBinding::HttpPost, sso_url),
            ],
            signing_certificates: vec![certificate],
            ..Self::default()
        }
    }

    /// Returns the first SSO endpoint for `binding`.
    #[must_use]
    pub fn sso_location(&self, binding: SamlBinding) -> Option<&str> {
        self.sso_endpoints
            .iter()
            .find(|e| e.binding == binding.uri())
            .map(|e| e.location.as_str())
    }

    /// Returns the certificates trusted for signatures from this entity.
    #[must_use]
    pub fn trusted_certificates(&self) -> &[Certificate] {
        &self.signing_certificates
    }

    /// Returns the advertised NameID formats this SP understands, in
    /// document order. Unknown URIs are skipped.
    pub fn supported_name_id_formats(&self) -> impl Iterator<Item = NameIdFormat> + '_ {
        self.name_id_formats
            .iter()
            .filter_map(|uri| NameIdFormat::from_uri(uri))
    }

    /// Returns true if the entity advertises `format`, or advertises no
    /// formats at all.
    #[must_use]
    pub fn accepts_name_id_format(&self, format: NameIdFormat) -> bool {
        self.name_id_formats.is_empty() || self.supported_name_id_formats().any(|f| f == format)
    }

    /// Returns true if this descriptor has an IdP role.
    #[must_use]
    pub fn is_identity_provider(&self) -> bool {
        !self.sso_endpoints.is_empty()
    }
}

/// Parses metadata for either role.
///
/// An `md:EntitiesDescriptor` wrapper is accepted; the first entity with an
/// `IDPSSODescriptor` is used, or the first entity when none has one.
/// A `KeyDescriptor` without `use` counts as a signing key.
///
/// # Errors
///
/// Returns [`SamlError::MetadataParse`] if the document is malformed, has no
/// `entityID`, or has neither an SSO nor an ACS endpoint.
pub fn parse_metadata(input: &str) -> SamlResult<EntityDescriptor> {
    let doc = xml::parse_document(input, &METADATA_PARSE_LIMITS).map_err(metadata_error)?;
    let root = doc.root_element();

    let entity = if xml::is_element(root, ns::MD, "EntityDescriptor") {
        root
    } else if xml::is_element(root, ns::MD, "EntitiesDescriptor") {
        let mut entities = root
            .descendants()
            .filter(|n| xml::is_element(*n, ns::MD, "EntityDescriptor"));
        let first = entities.clone().next();
        entities
            .find(|e| xml::child(*e, ns::MD, "IDPSSODescriptor").is_some())
            .or(first)
            .ok_or_else(|| SamlError::MetadataParse("EntitiesDescriptor contains no entity".to_string()))?
    } else {
        return Err(SamlError::MetadataParse(format!(
            "expected md:EntityDescriptor, found {}",
            root.tag_name().name()
        )));
    };

    let entity_id = entity
        .attribute("entityID")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SamlError::MetadataParse("EntityDescriptor has no entityID".to_string()))?;

    let mut descriptor = EntityDescriptor {
        entity_id: entity_id.to_string(),
        ..EntityDescriptor::default()
    };

    for role in entity.children().filter(Node::is_element) {
        if xml::is_element(role, ns::MD, "IDPSSODescriptor") {
            descriptor.sso_endpoints.extend(endpoints(role, "SingleSignOnService"));
            descriptor.want_authn_requests_signed |= bool_attr(role, "WantAuthnRequestsSigned");
        } else if xml::is_element(role, ns::MD, "SPSSODescriptor") {
            descriptor.acs_endpoints.extend(endpoints(role, "AssertionConsumerService"));
            descriptor.authn_requests_signed |= bool_attr(role, "AuthnRequestsSigned");
            descriptor.want_assertions_signed |= bool_attr(role, "WantAssertionsSigned");
        } else {
            continue;
        }

        // Both roles of one entity repeat the shared elements.
        for endpoint in endpoints(role, "SingleLogoutService") {
            push_unique(&mut descriptor.slo_endpoints, endpoint);
        }
        for format in xml::children(role, ns::MD, "NameIDFormat").map(xml::text_content) {
            push_unique(&mut descriptor.name_id_formats, format);
        }
        for certificate in signing_certificates(role)? {
            push_unique(&mut descriptor.signing_certificates, certificate);
        }
    }

    if descriptor.sso_endpoints.is_empty() && descriptor.acs_endpoints.is_empty() {
        return Err(SamlError::MetadataParse(format!(
            "{entity_id} has neither a SingleSignOnService nor an AssertionConsumerService"
        )));
    }

    Ok(descriptor)
}

/// Parses IdP metadata and checks that it can be used for SSO.
///
/// # Errors
///
/// Returns [`SamlError::MetadataParse`] if [`parse_metadata`] fails or the
/// entity lacks an SSO endpoint or a signing certificate.
pub fn parse_idp_metadata(input: &str) -> SamlResult<EntityDescriptor> {
    let descriptor = parse_metadata(input)?;
    if descriptor.sso_endpoints.is_empty() {
        return Err(SamlError::MetadataParse(format!(
            "{} is not an identity provider (no SingleSignOnService)",
            descriptor.entity_id
        )));
    }
    if descriptor.signing_certificates.is_empty() {
        return Err(SamlError::MetadataParse(format!(
            "{} publishes no signing certificate",
            descriptor.entity_id
        )));
    }
    Ok(descriptor)
}

/// Serializes a descriptor as an `md:EntityDescriptor` document.
///
/// An `IDPSSODescriptor` is written when SSO endpoints are present and an
/// `SPSSODescriptor` when ACS endpoints are present.
#[must_use]
pub fn serialize_metadata(descriptor: &EntityDescriptor) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push('\n');
    let _ = writeln!(
        out,
        r#"<md:EntityDescriptor xmlns:md="{}" xmlns:ds="{}" entityID="{}">"#,
        ns::MD,
        ns::DS,
        xml::escape(&descriptor.entity_id)
    );

    if !descriptor.sso_endpoints.is_empty() {
        let _ = writeln!(
            out,
            r#"  <md:IDPSSODescriptor WantAuthnRequestsSigned="{}" protocolSupportEnumeration="{}">"#,
            descriptor.want_authn_requests_signed,
            ns::SAMLP
        );
        write_role_body(&mut out, descriptor, "SingleSignOnService", &descriptor.sso_endpoints, false);
        out.push_str("  </md:IDPSSODescriptor>\n");
    }

    if !descriptor.acs_endpoints.is_empty() {
        let _ = writeln!(
            out,
            r#"  <md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="{}" protocolSupportEnumeration="{}">"#,
            descriptor.authn_requests_signed,
            descriptor.want_assertions_signed,
            ns::SAMLP
        );
        write_role_body(
            &mut out,
            descriptor,
            "AssertionConsumerService",
            &descriptor.acs_endpoints,
            true,
        );
        out.push_str("  </md:SPSSODescriptor>\n");
    }

    out.push_str("</md:EntityDescriptor>\n");
    out
}

fn write_role_body(
    out: &mut String,
    descriptor: &EntityDescriptor,
    service: &str,
    services: &[Endpoint],
    indexed: bool,
) {
    for certificate in &descriptor.signing_certificates {
        let _ = writeln!(
            out,
            "    <md:KeyDescriptor use=\"signing\">\n      <ds:KeyInfo>\n        <ds:X509Data>\n          <ds:X509Certificate>{}</ds:X509Certificate>\n        </ds:X509Data>\n      </ds:KeyInfo>\n    </md:KeyDescriptor>",
            certificate.to_base64()
        );
    }
    for endpoint in &descriptor.slo_endpoints {
        let _ = writeln!(
            out,
            r#"    <md:SingleLogoutService Binding="{}" Location="{}"/>"#,
            xml::escape(&endpoint.binding),
            xml::escape(&endpoint.location)
        );
    }
    for format in &descriptor.name_id_formats {
        let _ = writeln!(out, "    <md:NameIDFormat>{}</md:NameIDFormat>", xml::escape(format));
    }
    for (index, endpoint) in services.iter().enumerate() {
        let index_attrs = if indexed {
            format!(r#" index="{index}" isDefault="{}""#, index == 0)
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            r#"    <md:{service} Binding="{}" Location="{}"{index_attrs}/>"#,
            xml::escape(&endpoint.binding),
            xml::escape(&endpoint.location)
        );
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn endpoints<'a>(role: Node<'a, '_>, name: &'a str) -> impl Iterator<Item = Endpoint> + 'a {
    xml::children(role, ns::MD, name).filter_map(|service| {
        Some(Endpoint {
            binding: service.attribute("Binding")?.to_string(),
            location: service.attribute("Location")?.to_string(),
        })
    })
}

fn signing_certificates(role: Node<'_, '_>) -> SamlResult<Vec<Certificate>> {
    let mut certificates = Vec::new();
    for key in xml::children(role, ns::MD, "KeyDescriptor") {
        if key.attribute("use").is_some_and(|usage| usage != "signing") {
            continue;
        }
        let encoded = key
            .descendants()
            .filter(|n| xml::is_element(*n, ns::DS, "X509Certificate"));
        for cert in encoded {
            let certificate = Certificate::from_pem_or_base64(&xml::text_content(cert))
                .map_err(|e| SamlError::MetadataParse(format!("invalid signing certificate: {e}")))?;
            certificates.push(certificate);
        }
    }
    Ok(certificates)
}

fn bool_attr(node: Node<'_, '_>, name: &str) -> bool {
    matches!(node.attribute(name), Some("true" | "1"))
}

fn metadata_error(err: SamlError) -> SamlError {
    match err {
        SamlError::MetadataParse(_) => err,
        other => SamlError::MetadataParse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> SigningCredentials {
        SigningCredentials::generate().unwrap()
    }

    fn idp_metadata(cert: &Certificate, key_use: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="http://localhost:8080/realms/myrealm">
  <md:IDPSSODescriptor WantAuthnRequestsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor{key_use}>
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data><ds:X509Certificate>
{}
        </ds:X509Certificate></ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="http://localhost:8080/realms/myrealm/protocol/saml"/>
    <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:persistent</md:NameIDFormat>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="http://localhost:8080/realms/myrealm/protocol/saml"/>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="http://localhost:8080/realms/myrealm/protocol/saml/redirect"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
            cert.to_base64()
        )
    }

    #[test]
    fn parses_idp_metadata() {
        let creds = credentials();
        let xml = idp_metadata(creds.certificate(), r#" use="signing""#);
        let idp = parse_idp_metadata(&xml).unwrap();

        assert_eq!(idp.entity_id, "http://localhost:8080/realms/myrealm");
        assert_eq!(idp.sso_endpoints.len(), 2);
        assert_eq!(
            idp.sso_location(SamlBinding::HttpRedirect),
            Some("http://localhost:8080/realms/myrealm/protocol/saml/redirect")
        );
        assert_eq!(idp.signing_certificates, vec![creds.certificate().clone()]);
        assert!(idp.want_authn_requests_signed);
        assert_eq!(idp.slo_endpoints.len(), 1);
        assert_eq!(idp.name_id_formats.len(), 1);
    }

    #[test]
    fn advertised_name_id_formats_are_typed() {
        let creds = credentials();
        let xml = idp_metadata(creds.certificate(), "").replace(
            "<md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:persistent</md:NameIDFormat>",
            "<md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName</md:NameIDFormat>\
             <md:NameIDFormat>urn:example:custom-format</md:NameIDFormat>\
             <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:entity</md:NameIDFormat>",
        );
        let idp = parse_idp_metadata(&xml).unwrap();

        assert_eq!(idp.name_id_formats.len(), 3);
        assert_eq!(
            idp.supported_name_id_formats().collect::<Vec<_>>(),
            vec![NameIdFormat::X509SubjectName, NameIdFormat::Entity]
        );
        assert!(idp.accepts_name_id_format(NameIdFormat::Entity));
        assert!(!idp.accepts_name_id_format(NameIdFormat::Email));
    }

    #[test]
    fn no_advertised_formats_accepts_any() {
        let creds = credentials();
        let idp = EntityDescriptor::manual_idp(
            "https://idp.example.com",
            "https://idp.example.com/sso",
            creds.certificate().clone(),
        );
        assert!(idp.accepts_name_id_format(NameIdFormat::Transient));
    }

    #[test]
    fn key_descriptor_without_use_is_a_signing_key() {
        let creds = credentials();
        let idp = parse_idp_metadata(&idp_metadata(creds.certificate(), "")).unwrap();
        assert_eq!(idp.signing_certificates.len(), 1);
    }

    #[test]
    fn encryption_only_key_is_not_trusted_for_signatures() {
        let creds = credentials();
        let xml = idp_metadata(creds.certificate(), r#" use="encryption""#);
        let err = parse_idp_metadata(&xml).unwrap_err();
        assert!(err.to_string().contains("no signing certificate"));
    }

    #[test]
    fn entities_descriptor_wrapper_selects_the_idp() {
        let creds = credentials();
        let idp = idp_metadata(creds.certificate(), "");
        let inner = idp.trim_start_matches(r#"<?xml version="1.0"?>"#);
        let xml = format!(
            r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata">
  <md:EntityDescriptor entityID="https://sp.example.com">
    <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
      <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.example.com/acs" index="0"/>
    </md:SPSSODescriptor>
  </md:EntityDescriptor>
  {inner}
</md:EntitiesDescriptor>"#
        );
        let parsed = parse_metadata(&xml).unwrap();
        assert_eq!(parsed.entity_id, "http://localhost:8080/realms/myrealm");
    }

    #[test]
    fn missing_entity_id_is_rejected() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://idp/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;
        let err = parse_metadata(xml).unwrap_err();
        assert!(matches!(err, SamlError::MetadataParse(_)));
    }

    #[test]
    fn entity_without_endpoints_is_rejected() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="x"/>"#;
        assert!(matches!(parse_metadata(xml), Err(SamlError::MetadataParse(_))));
    }

    #[test]
    fn malformed_xml_is_a_metadata_error() {
        let err = parse_metadata("<md:EntityDescriptor").unwrap_err();
        assert!(matches!(err, SamlError::MetadataParse(_)));
    }

    #[test]
    fn sp_metadata_round_trips() {
        let creds = credentials();
        let config = ServiceProviderConfig::new(
            "http://localhost:3000/metadata",
            "http://localhost:3000/acs",
        )
        .with_slo_url("http://localhost:3000/slo");
        let descriptor = EntityDescriptor::service_provider(&config, &creds);

        let xml = serialize_metadata(&descriptor);
        assert!(xml.contains(r#"use="signing""#));
        assert!(xml.contains(r#"AuthnRequestsSigned="true""#));

        let parsed = parse_metadata(&xml).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn idp_metadata_round_trips() {
        let creds = credentials();
        let descriptor = parse_idp_metadata(&idp_metadata(creds.certificate(), "")).unwrap();
        let reparsed = parse_idp_metadata(&serialize_metadata(&descriptor)).unwrap();
        assert_eq!(reparsed, descriptor);
    }

    #[test]
    fn dual_role_metadata_round_trips() {
        let creds = credentials();
        let mut descriptor = EntityDescriptor::manual_idp(
            "https://proxy.example.com",
            "https://proxy.example.com/sso",
            creds.certificate().clone(),
        );
        descriptor
            .acs_endpoints
            .push(Endpoint::new(SamlBinding::HttpPost, "https://proxy.example.com/acs"));
        descriptor
            .slo_endpoints
            .push(Endpoint::new(SamlBinding::HttpRedirect, "https://proxy.example.com/slo"));
        descriptor
            .name_id_formats
            .push(NameIdFormat::Persistent.uri().to_string());

        let xml = serialize_metadata(&descriptor);
        assert_eq!(xml.matches("<md:SingleLogoutService").count(), 2);

        let parsed = parse_metadata(&xml).unwrap();
        assert_eq!(parsed.slo_endpoints.len(), 1);
        assert_eq!(parsed.name_id_formats.len(), 1);
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn manual_idp_registers_both_bindings() {
        let creds = credentials();
        let idp = EntityDescriptor::manual_idp(
            "https://idp.example.com",
            "https://idp.example.com/sso",
            creds.certificate().clone(),
        );
        assert_eq!(idp.sso_location(SamlBinding::HttpPost), Some("https://idp.example.com/sso"));
        assert_eq!(
            idp.sso_location(SamlBinding::HttpRedirect),
            Some("https://idp.example.com/sso")
        );
        assert_eq!(idp.trusted_certificates(), &[creds.certificate().clone()]);
    }
}
