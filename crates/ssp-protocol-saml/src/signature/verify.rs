//! Enveloped XML-DSig verification.

use base64::Engine;
use roxmltree::Node;
use ssp_crypto::{constant_time_eq, digest, verify_signature, HashAlgorithm, SignatureAlgorithm};

use crate::credentials::Certificate;
use crate::error::{SamlError, SamlResult};
use crate::types::ENVELOPED_SIGNATURE_TRANSFORM;
use crate::xml::c14n::{canonicalize, ExclusiveC14n};
use crate::xml::{self, ns};

/// Verification policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Accept RSA-SHA1 signatures and SHA-1 digests.
    pub allow_sha1: bool,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    /// ID of the element the signature covers.
    pub reference_id: String,
    /// Signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// Digest algorithm used for the reference.
    pub digest_algorithm: HashAlgorithm,
}

/// Verifies the enveloped signature that is a direct child of `element`.
///
/// The signature must reference `element` by its `ID`, and its
/// `SignatureValue` must verify with one of `trusted`. A certificate embedded
/// in `KeyInfo` is only used to pick among `trusted`, never as a trust anchor
/// of its own.
///
/// # Errors
///
/// Returns [`SamlError::SignatureInvalid`] describing the first check that
/// failed.
pub fn verify_signed_xml(
    element: Node<'_, '_>,
    trusted: &[Certificate],
    policy: &VerificationPolicy,
) -> SamlResult<VerifiedSignature> {
    if trusted.is_empty() {
        return Err(invalid("no trusted certificate configured"));
    }

    let mut signatures = xml::children(element, ns::DS, "Signature");
    let signature = signatures
        .next()
        .ok_or_else(|| invalid(format!("{} is not signed", element.tag_name().name())))?;
    if signatures.next().is_some() {
        return Err(invalid("more than one signature on the same element"));
    }

    let element_id = element
        .attribute("ID")
        .ok_or_else(|| invalid("signed element has no ID"))?;

    let signed_info = ds_child(signature, "SignedInfo")?;
    let signed_info_c14n = c14n_method(ds_child(signed_info, "CanonicalizationMethod")?)?;

    let method_uri = algorithm_attr(ds_child(signed_info, "SignatureMethod")?)?;
    let algorithm = SignatureAlgorithm::from_xml_dsig_uri(method_uri)
        .ok_or_else(|| invalid(format!("unsupported signature method {method_uri}")))?;
    if algorithm.is_legacy() && !policy.allow_sha1 {
        return Err(invalid(format!("{method_uri} is not allowed")));
    }

    let mut references = xml::children(signed_info, ns::DS, "Reference");
    let reference = references
        .next()
        .ok_or_else(|| invalid("SignedInfo has no Reference"))?;
    if references.next().is_some() {
        return Err(invalid("SignedInfo has more than one Reference"));
    }

    let expected_uri = format!("#{element_id}");
    match reference.attribute("URI") {
        Some(uri) if uri == expected_uri => {}
        other => {
            return Err(invalid(format!(
                "reference URI {other:?} does not point at the signed element {expected_uri}"
            )))
        }
    }

    let reference_c14n = reference_transforms(reference)?;

    let digest_uri = algorithm_attr(ds_child(reference, "DigestMethod")?)?;
    let digest_algorithm = HashAlgorithm::from_xml_dsig_uri(digest_uri)
        .ok_or_else(|| invalid(format!("unsupported digest method {digest_uri}")))?;
    if digest_algorithm.is_legacy() && !policy.allow_sha1 {
        return Err(invalid(format!("{digest_uri} is not allowed")));
    }

    let expected_digest = decode_base64(&xml::text_content(ds_child(reference, "DigestValue")?))?;
    let canonical = canonicalize(element, Some(signature.id()), &reference_c14n)?;
    let actual_digest = digest(digest_algorithm, canonical.as_bytes());
    if !constant_time_eq(&expected_digest, &actual_digest) {
        return Err(invalid(format!("digest mismatch for {expected_uri}")));
    }

    let canonical_signed_info = canonicalize(signed_info, None, &signed_info_c14n)?;
    let signature_value =
        decode_base64(&xml::text_content(ds_child(signature, "SignatureValue")?))?;

    for certificate in candidate_certificates(signature, trusted) {
        if verify_signature(
            certificate.der(),
            algorithm,
            canonical_signed_info.as_bytes(),
            &signature_value,
        )
        .is_ok()
        {
            return Ok(VerifiedSignature {
                reference_id: element_id.to_string(),
                algorithm,
                digest_algorithm,
            });
        }
    }

    Err(invalid("signature value does not verify with any trusted certificate"))
}

/// Returns the trusted certificates to try, narrowed to the one embedded in
/// `KeyInfo` when it is among them.
fn candidate_certificates<'t>(signature: Node<'_, '_>, trusted: &'t [Certificate]) -> Vec<&'t Certificate> {
    let embedded = xml::child(signature, ns::DS, "KeyInfo")
        .and_then(|info| xml::child(info, ns::DS, "X509Data"))
        .and_then(|data| xml::child(data, ns::DS, "X509Certificate"))
        .and_then(|cert| Certificate::from_pem_or_base64(&xml::text_content(cert)).ok());

    match embedded {
        Some(embedded) => match trusted.iter().find(|t| **t == embedded) {
            Some(matching) => vec![matching],
            None => {
                tracing::debug!("embedded signing certificate is not trusted, trying configured ones");
                trusted.iter().collect()
            }
        },
        None => trusted.iter().collect(),
    }
}

fn reference_transforms(reference: Node<'_, '_>) -> SamlResult<ExclusiveC14n> {
    let transforms = ds_child(reference, "Transforms")?;
    let mut enveloped = false;
    let mut c14n = None;

    for transform in xml::children(transforms, ns::DS, "Transform") {
        let uri = algorithm_attr(transform)?;
        if uri == ENVELOPED_SIGNATURE_TRANSFORM {
            enveloped = true;
        } else {
            c14n = Some(c14n_method(transform)?);
        }
    }

    if !enveloped {
        return Err(invalid("reference lacks the enveloped-signature transform"));
    }
    c14n.ok_or_else(|| invalid("reference lacks an exclusive canonicalization transform"))
}

fn c14n_method(node: Node<'_, '_>) -> SamlResult<ExclusiveC14n> {
    let uri = algorithm_attr(node)?;
    let method = ExclusiveC14n::from_uri(uri)
        .ok_or_else(|| invalid(format!("unsupported canonicalization {uri}")))?;
    Ok(match xml::child(node, ns::EXC_C14N, "InclusiveNamespaces")
        .and_then(|n| n.attribute("PrefixList"))
    {
        Some(list) => method.with_prefix_list(list),
        None => method,
    })
}

fn ds_child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> SamlResult<Node<'a, 'i>> {
    xml::child(node, ns::DS, name)
        .ok_or_else(|| invalid(format!("{} has no {name}", node.tag_name().name())))
}

fn algorithm_attr<'a>(node: Node<'a, '_>) -> SamlResult<&'a str> {
    node.attribute("Algorithm")
        .ok_or_else(|| invalid(format!("{} has no Algorithm", node.tag_name().name())))
}

fn decode_base64(text: &str) -> SamlResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| invalid(format!("invalid base64 in signature: {e}")))
}

fn invalid(message: impl Into<String>) -> SamlError {
    SamlError::SignatureInvalid(message.into())
}
