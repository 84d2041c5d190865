//! Validation of SAML Responses received at the assertion consumer service.
//!
//! [`ResponseValidator`] runs a fixed pipeline and stops at the first
//! failure:
//!
//! 1. transport decoding of the base64 form field,
//! 2. hardened XML parsing (no DTDs, size, depth and node limits),
//! 3. XML signature verification against the IdP's certificates,
//! 4. top level status,
//! 5. validity windows of conditions and bearer confirmations,
//! 6. audience restriction,
//! 7. issuer of the response and of each assertion,
//!
//! followed by destination, recipient and request correlation checks. The
//! identity is extracted from the first assertion, but every assertion must
//! pass every check. Debug settings only affect what callers log or show;
//! nothing here can be relaxed by them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use roxmltree::Node;

use crate::bindings::{HttpPostBinding, SamlMessageType};
use crate::config::ServiceProviderConfig;
use crate::error::{SamlError, SamlResult};
use crate::metadata::EntityDescriptor;
use crate::replay::PendingRequests;
use crate::signature::{verify_signed_xml, VerificationPolicy};
use crate::types::{check_window, Assertion, SamlResponse};
use crate::xml::{self, ns};

/// The authenticated identity carried by a valid Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    /// Subject NameID value.
    pub name_id: String,
    /// NameID format URI.
    pub name_id_format: Option<String>,
    /// Attributes of the first assertion, values in document order.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// IdP session index, needed for logout.
    pub session_index: Option<String>,
    /// End of the assertion's validity.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// IdP entity ID.
    pub issuer: String,
    /// Request this Response answers.
    pub in_response_to: Option<String>,
    /// When the user authenticated at the IdP.
    pub authn_instant: Option<DateTime<Utc>>,
}

/// Validates Responses from one IdP for one SP.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    sp: Arc<ServiceProviderConfig>,
    idp: Arc<EntityDescriptor>,
    pending: Option<Arc<PendingRequests>>,
}

impl ResponseValidator {
    /// Creates a validator without request correlation.
    #[must_use]
    pub fn new(sp: Arc<ServiceProviderConfig>, idp: Arc<EntityDescriptor>) -> Self {
        Self {
            sp,
            idp,
            pending: None,
        }
    }

    /// Requires each Response to answer a request recorded in `pending`.
    #[must_use]
    pub fn with_pending_requests(mut self, pending: Arc<PendingRequests>) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Returns the IdP descriptor this validator trusts.
    #[must_use]
    pub fn idp(&self) -> &EntityDescriptor {
        &self.idp
    }

    /// Validates a base64 `SAMLResponse` form value at the current time.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; see the module docs.
    pub fn validate(&self, encoded: &str) -> SamlResult<ValidatedIdentity> {
        self.validate_at(encoded, Utc::now())
    }

    /// Validates a base64 `SAMLResponse` form value as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; see the module docs.
    pub fn validate_at(&self, encoded: &str, now: DateTime<Utc>) -> SamlResult<ValidatedIdentity> {
        let decoded = HttpPostBinding::decode(encoded, SamlMessageType::Response, None)?;
        self.validate_xml_at(&decoded.xml, now)
    }

    /// Validates an already decoded Response document as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step after decoding.
    pub fn validate_xml_at(&self, input: &str, now: DateTime<Utc>) -> SamlResult<ValidatedIdentity> {
        let doc = xml::parse_document(input, &self.sp.parse_limits)?;
        let root = doc.root_element();
        SamlResponse::check_envelope(root)?;

        xml::id_map(&doc)?;
        let assertion_nodes: Vec<Node<'_, '_>> =
            xml::children(root, ns::SAML, "Assertion").collect();
        self.verify_signatures(root, &assertion_nodes)?;

        let assertions = assertion_nodes
            .iter()
            .map(|node| Assertion::from_element(*node))
            .collect::<SamlResult<Vec<_>>>()?;
        let response = SamlResponse::from_parts(root, assertions)?;

        if !response.status.is_success() {
            tracing::info!(
                status = response.status.code.uri(),
                sub_status = ?response.status.sub_code,
                "identity provider rejected authentication"
            );
            return Err(SamlError::AssertionRejected {
                status: response.status.code.uri().to_string(),
                sub_status: response.status.sub_code.clone(),
                message: response.status.message.clone(),
            });
        }

        if response.assertions.is_empty() {
            return Err(SamlError::MissingElement("Assertion in Response".to_string()));
        }

        for assertion in &response.assertions {
            self.check_validity(assertion, now)?;
        }
        for assertion in &response.assertions {
            self.check_audience(assertion)?;
        }
        self.check_issuers(&response)?;
        self.check_destinations(&response)?;
        self.check_correlation(&response)?;

        let identity = extract_identity(&response)?;
        tracing::info!(
            name_id = %identity.name_id,
            issuer = %identity.issuer,
            session_index = ?identity.session_index,
            "SAML response validated"
        );
        Ok(identity)
    }

    fn verify_signatures(&self, root: Node<'_, '_>, assertions: &[Node<'_, '_>]) -> SamlResult<()> {
        let trusted = self.idp.trusted_certificates();
        let policy = VerificationPolicy {
            allow_sha1: self.sp.allow_sha1,
        };

        let response_signed = if xml::child(root, ns::DS, "Signature").is_some() {
            verify_signed_xml(root, trusted, &policy)?;
            tracing::debug!("response signature verified");
            true
        } else {
            false
        };

        for assertion in assertions {
            let id = assertion.attribute("ID").unwrap_or_default();
            if xml::child(*assertion, ns::DS, "Signature").is_some() {
                verify_signed_xml(*assertion, trusted, &policy)?;
                tracing::debug!(assertion_id = id, "assertion signature verified");
            } else if !response_signed {
                return Err(SamlError::SignatureInvalid(format!(
                    "assertion {id} is covered by no signature"
                )));
            }
        }
        Ok(())
    }

    fn check_validity(&self, assertion: &Assertion, now: DateTime<Utc>) -> SamlResult<()> {
        let skew = self.sp.clock_skew;
        if let Some(conditions) = &assertion.conditions {
            conditions.check_validity(now, skew)?;
        }
        for confirmation in assertion.bearer_confirmations() {
            check_window(
                confirmation.not_before,
                confirmation.not_on_or_after,
                now,
                skew,
                "subject confirmation",
            )?;
        }
        Ok(())
    }

    fn check_audience(&self, assertion: &Assertion) -> SamlResult<()> {
        match &assertion.conditions {
            Some(conditions) => conditions.check_audience(&self.sp.entity_id),
            None => Err(SamlError::InvalidAudience {
                expected: self.sp.entity_id.clone(),
                actual: "no conditions".to_string(),
            }),
        }
    }

    fn check_issuers(&self, response: &SamlResponse) -> SamlResult<()> {
        let expected = &self.idp.entity_id;
        let issuers = response
            .issuer
            .iter()
            .chain(response.assertions.iter().map(|a| &a.issuer));
        for issuer in issuers {
            if issuer != expected {
                return Err(SamlError::InvalidIssuer {
                    expected: expected.clone(),
                    actual: issuer.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_destinations(&self, response: &SamlResponse) -> SamlResult<()> {
        let expected = &self.sp.acs_url;
        let recipients = response
            .assertions
            .iter()
            .flat_map(Assertion::bearer_confirmations)
            .filter_map(|c| c.recipient.as_ref());
        for actual in response.destination.iter().chain(recipients) {
            if actual != expected {
                return Err(SamlError::InvalidDestination {
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_correlation(&self, response: &SamlResponse) -> SamlResult<()> {
        let confirmed = response
            .assertions
            .iter()
            .flat_map(Assertion::bearer_confirmations)
            .filter_map(|c| c.in_response_to.as_deref());
        for in_response_to in confirmed {
            if response.in_response_to.as_deref() != Some(in_response_to) {
                return Err(SamlError::UnsolicitedResponse(format!(
                    "subject confirmation answers {in_response_to}, response answers {:?}",
                    response.in_response_to
                )));
            }
        }

        let Some(pending) = &self.pending else {
            return Ok(());
        };
        let request_id = response.in_response_to.as_deref().ok_or_else(|| {
            SamlError::UnsolicitedResponse("IdP-initiated responses are not accepted".to_string())
        })?;
        if !pending.consume(request_id) {
            return Err(SamlError::UnsolicitedResponse(format!(
                "{request_id} is not an outstanding request"
            )));
        }
        Ok(())
    }
}

fn extract_identity(response: &SamlResponse) -> SamlResult<ValidatedIdentity> {
    let first = response
        .assertions
        .first()
        .ok_or_else(|| SamlError::MissingElement("Assertion in Response".to_string()))?;
    let name_id = first
        .subject
        .name_id
        .as_ref()
        .ok_or_else(|| SamlError::MissingElement("NameID in Subject".to_string()))?;

    let not_on_or_after = first
        .conditions
        .as_ref()
        .and_then(|c| c.not_on_or_after)
        .or_else(|| first.bearer_confirmations().find_map(|c| c.not_on_or_after));

    Ok(ValidatedIdentity {
        name_id: name_id.value.clone(),
        name_id_format: name_id.format.clone(),
        attributes: first.attributes.clone(),
        session_index: first.session_index().map(str::to_string),
        not_on_or_after,
        issuer: first.issuer.clone(),
        in_response_to: response.in_response_to.clone(),
        authn_instant: first.authn_statement.as_ref().map(|s| s.authn_instant),
    })
}
