//! Enveloped XML-DSig creation.

use base64::Engine;
use ssp_crypto::{digest, RsaSigningKey, SignatureAlgorithm};

use crate::credentials::Certificate;
use crate::error::{SamlError, SamlResult};
use crate::types::ENVELOPED_SIGNATURE_TRANSFORM;
use crate::xml::c14n::{canonicalize, ExclusiveC14n, EXC_C14N};
use crate::xml::{self, ns, ParseLimits};

/// Signs SAML elements with an enveloped signature.
#[derive(Debug, Clone, Copy)]
pub struct XmlSigner<'k> {
    key: &'k RsaSigningKey,
    certificate: Option<&'k Certificate>,
    algorithm: SignatureAlgorithm,
}

impl<'k> XmlSigner<'k> {
    /// Creates a signer using RSA-SHA256.
    #[must_use]
    pub fn new(key: &'k RsaSigningKey) -> Self {
        Self {
            key,
            certificate: None,
            algorithm: SignatureAlgorithm::RsaSha256,
        }
    }

    /// Embeds `certificate` in `KeyInfo`.
    #[must_use]
    pub fn with_certificate(mut self, certificate: &'k Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Uses `algorithm` instead of RSA-SHA256.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Signs the element whose `ID` is `id` and returns the new document.
    ///
    /// The signature is inserted directly after the element's `saml:Issuer`,
    /// as the SAML schema requires, without adding whitespace, so removing
    /// it restores the exact octets that were digested.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse, no element has that
    /// ID, the element has no `Issuer`, or signing fails.
    pub fn sign_enveloped(&self, document: &str, id: &str) -> SamlResult<String> {
        let doc = xml::parse_document(document, &ParseLimits::default())?;
        let element = doc
            .descendants()
            .find(|n| n.is_element() && n.attribute("ID") == Some(id))
            .ok_or_else(|| SamlError::MissingElement(format!("element with ID {id}")))?;
        let issuer = xml::require_child(element, ns::SAML, "Issuer")?;

        let c14n = ExclusiveC14n::default();
        let canonical = canonicalize(element, None, &c14n)?;
        let digest_algorithm = self.algorithm.hash_algorithm();
        let digest_value = base64::engine::general_purpose::STANDARD
            .encode(digest(digest_algorithm, canonical.as_bytes()));

        let signed_info = format!(
            r##"<ds:SignedInfo xmlns:ds="{ds}"><ds:CanonicalizationMethod Algorithm="{c14n}"/><ds:SignatureMethod Algorithm="{alg}"/><ds:Reference URI="#{id}"><ds:Transforms><ds:Transform Algorithm="{enveloped}"/><ds:Transform Algorithm="{c14n}"/></ds:Transforms><ds:DigestMethod Algorithm="{digest_alg}"/><ds:DigestValue>{digest_value}</ds:DigestValue></ds:Reference></ds:SignedInfo>"##,
            ds = ns::DS,
            c14n = EXC_C14N,
            alg = self.algorithm.xml_dsig_uri(),
            id = xml::escape(id),
            enveloped = ENVELOPED_SIGNATURE_TRANSFORM,
            digest_alg = digest_algorithm.xml_dsig_uri(),
        );

        let signed_info_doc = xml::parse_document(&signed_info, &ParseLimits::default())?;
        let canonical_signed_info = canonicalize(signed_info_doc.root_element(), None, &c14n)?;
        let signature_value = base64::engine::general_purpose::STANDARD.encode(
            self.key
                .sign(self.algorithm, canonical_signed_info.as_bytes())?,
        );

        let key_info = self
            .certificate
            .map(|cert| {
                format!(
                    "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                    cert.to_base64()
                )
            })
            .unwrap_or_default();

        let signature = format!(
            r#"<ds:Signature xmlns:ds="{ds}">{signed_info}<ds:SignatureValue>{signature_value}</ds:SignatureValue>{key_info}</ds:Signature>"#,
            ds = ns::DS,
        );

        let insert_at = issuer.range().end;
        let mut signed = String::with_capacity(document.len() + signature.len());
        signed.push_str(&document[..insert_at]);
        signed.push_str(&signature);
        signed.push_str(&document[insert_at..]);
        Ok(signed)
    }
}
