//! Mock identity provider used by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ssp_protocol_saml::signature::XmlSigner;
use ssp_protocol_saml::{
    format_instant, EntityDescriptor, ResponseValidator, ServiceProviderConfig, SigningCredentials,
};

pub const SP_ENTITY_ID: &str = "http://localhost:3000/metadata";
pub const ACS_URL: &str = "http://localhost:3000/acs";
pub const IDP_ENTITY_ID: &str = "http://localhost:8080/realms/myrealm";
pub const IDP_SSO_URL: &str = "http://localhost:8080/realms/myrealm/protocol/saml";

const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Fixed validation instant used by the tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn sp_config() -> ServiceProviderConfig {
    ServiceProviderConfig::new(SP_ENTITY_ID, ACS_URL).with_slo_url("http://localhost:3000/slo")
}

/// An IdP with its own freshly generated key pair.
pub struct MockIdp {
    pub credentials: SigningCredentials,
}

impl MockIdp {
    pub fn new() -> Self {
        Self {
            credentials: SigningCredentials::generate().unwrap(),
        }
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::manual_idp(
            IDP_ENTITY_ID,
            IDP_SSO_URL,
            self.credentials.certificate().clone(),
        )
    }

    pub fn validator(&self, sp: ServiceProviderConfig) -> ResponseValidator {
        ResponseValidator::new(Arc::new(sp), Arc::new(self.descriptor()))
    }

    /// Signs the response as this IdP would.
    pub fn sign(&self, response: &ResponseFixture) -> String {
        response.sign_with(&self.credentials)
    }
}

#[derive(Clone)]
pub struct AssertionFixture {
    pub id: String,
    pub issuer: String,
    pub name_id: String,
    pub attributes: Vec<(String, Vec<String>)>,
    pub audience: Option<String>,
    pub recipient: String,
    pub in_response_to: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
}

impl AssertionFixture {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            issuer: IDP_ENTITY_ID.to_string(),
            name_id: "user@example.com".to_string(),
            attributes: vec![("role".to_string(), vec!["admin".to_string()])],
            audience: Some(SP_ENTITY_ID.to_string()),
            recipient: ACS_URL.to_string(),
            in_response_to: None,
            not_before: now() - Duration::minutes(1),
            not_on_or_after: now() + Duration::minutes(5),
        }
    }

    pub fn to_xml(&self) -> String {
        let in_response_to = self
            .in_response_to
            .as_ref()
            .map(|id| format!(r#" InResponseTo="{id}""#))
            .unwrap_or_default();
        let audience = self
            .audience
            .as_ref()
            .map(|a| {
                format!("<saml:AudienceRestriction><saml:Audience>{a}</saml:Audience></saml:AudienceRestriction>")
            })
            .unwrap_or_default();
        let attributes: String = self
            .attributes
            .iter()
            .map(|(name, values)| {
                let values: String = values
                    .iter()
                    .map(|v| format!("<saml:AttributeValue>{v}</saml:AttributeValue>"))
                    .collect();
                format!(r#"<saml:Attribute Name="{name}">{values}</saml:Attribute>"#)
            })
            .collect();

        format!(
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{issued}">
    <saml:Issuer>{issuer}</saml:Issuer>
    <saml:Subject>
      <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">{name_id}</saml:NameID>
      <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
        <saml:SubjectConfirmationData NotOnOrAfter="{not_on_or_after}" Recipient="{recipient}"{in_response_to}/>
      </saml:SubjectConfirmation>
    </saml:Subject>
    <saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">{audience}</saml:Conditions>
    <saml:AuthnStatement AuthnInstant="{not_before}" SessionIndex="_session-{id}">
      <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext>
    </saml:AuthnStatement>
    <saml:AttributeStatement>{attributes}</saml:AttributeStatement>
  </saml:Assertion>"#,
            id = self.id,
            issued = format_instant(&now()),
            issuer = self.issuer,
            name_id = self.name_id,
            recipient = self.recipient,
            not_before = format_instant(&self.not_before),
            not_on_or_after = format_instant(&self.not_on_or_after),
        )
    }
}

#[derive(Clone)]
pub struct ResponseFixture {
    pub id: String,
    pub issuer: Option<String>,
    pub destination: Option<String>,
    pub in_response_to: Option<String>,
    pub status: String,
    pub assertions: Vec<AssertionFixture>,
    pub sign_assertions: bool,
    pub sign_response: bool,
}

impl Default for ResponseFixture {
    fn default() -> Self {
        Self {
            id: "_response-1".to_string(),
            issuer: Some(IDP_ENTITY_ID.to_string()),
            destination: Some(ACS_URL.to_string()),
            in_response_to: None,
            status: SUCCESS.to_string(),
            assertions: vec![AssertionFixture::new("_assertion-1")],
            sign_assertions: true,
            sign_response: false,
        }
    }
}

impl ResponseFixture {
    /// Sets `InResponseTo` on the response and every confirmation.
    pub fn answering(mut self, request_id: &str) -> Self {
        self.in_response_to = Some(request_id.to_string());
        for assertion in &mut self.assertions {
            assertion.in_response_to = Some(request_id.to_string());
        }
        self
    }

    pub fn to_xml(&self) -> String {
        let mut attrs = String::new();
        if let Some(destination) = &self.destination {
            attrs.push_str(&format!(r#" Destination="{destination}""#));
        }
        if let Some(id) = &self.in_response_to {
            attrs.push_str(&format!(r#" InResponseTo="{id}""#));
        }
        let issuer = self
            .issuer
            .as_ref()
            .map(|i| format!("\n  <saml:Issuer>{i}</saml:Issuer>"))
            .unwrap_or_default();
        let assertions: String = self
            .assertions
            .iter()
            .map(|a| format!("\n  {}", a.to_xml()))
            .collect();

        format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{issued}"{attrs}>{issuer}
  <samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status>{assertions}
</samlp:Response>"#,
            id = self.id,
            issued = format_instant(&now()),
            status = self.status,
        )
    }

    pub fn sign_with(&self, credentials: &SigningCredentials) -> String {
        let signer = XmlSigner::new(credentials.signing_key()).with_certificate(credentials.certificate());
        let mut xml = self.to_xml();
        if self.sign_assertions {
            for assertion in &self.assertions {
                xml = signer.sign_enveloped(&xml, &assertion.id).unwrap();
            }
        }
        if self.sign_response {
            xml = signer.sign_enveloped(&xml, &self.id).unwrap();
        }
        xml
    }
}

pub fn encode(xml: &str) -> String {
    ssp_protocol_saml::bindings::HttpPostBinding::encode(xml)
}
