//! AuthnRequest construction for the Redirect and POST bindings.

use crate::bindings::{HttpPostBinding, HttpRedirectBinding, SamlMessageType};
use crate::config::ServiceProviderConfig;
use crate::credentials::SigningCredentials;
use crate::error::{SamlError, SamlResult};
use crate::metadata::EntityDescriptor;
use crate::signature::XmlSigner;
use crate::types::{AuthnRequest, SamlBinding};

/// An AuthnRequest ready to be sent to the IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedRequest {
    /// Send the browser to this URL.
    Redirect {
        /// IdP SSO URL with `SAMLRequest` and, if signed, `SigAlg` and
        /// `Signature` parameters.
        url: String,
    },
    /// Have the browser post a form.
    Post {
        /// IdP SSO URL.
        destination: String,
        /// Base64 `SAMLRequest` value.
        saml_request: String,
        /// RelayState value.
        relay_state: Option<String>,
        /// Auto-submitting HTML page.
        form_html: String,
    },
}

/// Builds and encodes an AuthnRequest for `binding`.
///
/// A fresh ID is generated on every call. When the SP signs requests, the
/// Redirect binding gets a detached query string signature and the POST
/// binding an enveloped XML signature.
///
/// # Errors
///
/// Returns [`SamlError::UnsupportedBinding`] if the IdP has no SSO endpoint
/// for `binding`, or a crypto error if signing fails.
pub fn build_authn_request(
    sp: &ServiceProviderConfig,
    credentials: &SigningCredentials,
    idp: &EntityDescriptor,
    binding: SamlBinding,
    relay_state: Option<&str>,
) -> SamlResult<(AuthnRequest, EncodedRequest)> {
    let destination = idp.sso_location(binding).ok_or_else(|| {
        SamlError::UnsupportedBinding(format!(
            "{} has no SingleSignOnService for {}",
            idp.entity_id,
            binding.uri()
        ))
    })?;

    let mut request = AuthnRequest::new(&sp.entity_id, destination, &sp.acs_url);
    if let Some(format) = sp.name_id_format {
        if !idp.accepts_name_id_format(format) {
            tracing::warn!(
                idp = %idp.entity_id,
                format = format.uri(),
                "identity provider does not advertise the requested NameID format"
            );
        }
        request = request.with_name_id_format(format);
    }
    let xml = request.to_xml();

    let encoded = match binding {
        SamlBinding::HttpRedirect => {
            let url = if sp.authn_requests_signed {
                HttpRedirectBinding::encode_signed_request(
                    &xml,
                    destination,
                    relay_state,
                    credentials.signing_key(),
                    sp.signature_algorithm,
                )?
            } else {
                HttpRedirectBinding::encode_request(&xml, destination, relay_state)?
            };
            EncodedRequest::Redirect { url }
        }
        SamlBinding::HttpPost => {
            let xml = if sp.authn_requests_signed {
                let (key, certificate) = credentials.signing_key_pair();
                XmlSigner::new(key)
                    .with_certificate(certificate)
                    .with_algorithm(sp.signature_algorithm)
                    .sign_enveloped(&xml, &request.id)?
            } else {
                xml
            };
            let saml_request = HttpPostBinding::encode(&xml);
            let form_html = HttpPostBinding::auto_submit_form(
                destination,
                SamlMessageType::Request,
                &saml_request,
                relay_state,
            );
            EncodedRequest::Post {
                destination: destination.to_string(),
                saml_request,
                relay_state: relay_state.map(str::to_string),
                form_html,
            }
        }
    };

    tracing::debug!(
        request_id = %request.id,
        destination,
        binding = binding.uri(),
        signed = sp.authn_requests_signed,
        "built AuthnRequest"
    );
    Ok((request, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{verify_signed_xml, VerificationPolicy};
    use crate::xml::{parse_document, ParseLimits};

    fn setup() -> (ServiceProviderConfig, SigningCredentials, EntityDescriptor) {
        let creds = SigningCredentials::generate().unwrap();
        let sp = ServiceProviderConfig::new(
            "http://localhost:3000/metadata",
            "http://localhost:3000/acs",
        );
        let idp = EntityDescriptor::manual_idp(
            "https://idp.example.com",
            "https://idp.example.com/sso",
            creds.certificate().clone(),
        );
        (sp, creds, idp)
    }

    #[test]
    fn redirect_request_round_trips() {
        let (sp, creds, idp) = setup();
        let (request, encoded) =
            build_authn_request(&sp, &creds, &idp, SamlBinding::HttpRedirect, Some("/profile"))
                .unwrap();
        let EncodedRequest::Redirect { url } = encoded else {
            panic!("expected redirect");
        };
        assert!(url.starts_with("https://idp.example.com/sso?SAMLRequest="));

        let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(decoded.relay_state.as_deref(), Some("/profile"));
        HttpRedirectBinding::verify_signature(&decoded, creds.certificate().der()).unwrap();

        let parsed = AuthnRequest::from_xml(&decoded.xml).unwrap();
        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.issuer, "http://localhost:3000/metadata");
        assert_eq!(parsed.destination, "https://idp.example.com/sso");
        assert_eq!(parsed.assertion_consumer_service_url, "http://localhost:3000/acs");
    }

    #[test]
    fn unsigned_redirect_has_no_signature() {
        let (sp, creds, idp) = setup();
        let sp = sp.with_authn_requests_signed(false);
        let (_, encoded) =
            build_authn_request(&sp, &creds, &idp, SamlBinding::HttpRedirect, None).unwrap();
        let EncodedRequest::Redirect { url } = encoded else {
            panic!("expected redirect");
        };
        assert!(!url.contains("Signature="));
    }

    #[test]
    fn post_request_carries_enveloped_signature() {
        let (sp, creds, idp) = setup();
        let (request, encoded) =
            build_authn_request(&sp, &creds, &idp, SamlBinding::HttpPost, None).unwrap();
        let EncodedRequest::Post {
            saml_request,
            form_html,
            ..
        } = encoded
        else {
            panic!("expected post");
        };
        assert!(form_html.contains(r#"name="SAMLRequest""#));

        let decoded = HttpPostBinding::decode(&saml_request, SamlMessageType::Request, None).unwrap();
        let doc = parse_document(&decoded.xml, &ParseLimits::default()).unwrap();
        let verified = verify_signed_xml(
            doc.root_element(),
            &[creds.certificate().clone()],
            &VerificationPolicy::default(),
        )
        .unwrap();
        assert_eq!(verified.reference_id, request.id);
    }

    #[test]
    fn every_request_gets_a_fresh_id() {
        let (sp, creds, idp) = setup();
        let (a, _) = build_authn_request(&sp, &creds, &idp, SamlBinding::HttpRedirect, None).unwrap();
        let (b, _) = build_authn_request(&sp, &creds, &idp, SamlBinding::HttpRedirect, None).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 41);
    }

    #[test]
    fn missing_endpoint_is_unsupported_binding() {
        let (sp, creds, mut idp) = setup();
        idp.sso_endpoints.retain(|e| e.saml_binding() == Some(SamlBinding::HttpPost));
        let err = build_authn_request(&sp, &creds, &idp, SamlBinding::HttpRedirect, None).unwrap_err();
        assert!(matches!(err, SamlError::UnsupportedBinding(_)));
    }
}
