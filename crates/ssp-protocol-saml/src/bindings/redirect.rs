//! HTTP-Redirect Binding implementation.
//!
//! Messages travel in the query string, DEFLATE compressed (raw, without a
//! zlib header), base64 and URL encoded. A signature, when present, is
//! detached: it covers `SAMLRequest=...&RelayState=...&SigAlg=...` exactly as
//! those octets appear in the URL.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use ssp_crypto::{verify_signature, RsaSigningKey, SignatureAlgorithm};

use crate::error::{SamlError, SamlResult};

use super::{DecodedMessage, SamlMessageType};

/// Upper bound for an inflated redirect message.
pub const MAX_INFLATED_SIZE: usize = 256 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes an unsigned SAML request into a redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    pub fn encode_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        let query = Self::message_query(xml, relay_state, SamlMessageType::Request)?;
        Ok(append_query(destination, &query))
    }

    /// Encodes a SAML request into a redirect URL carrying `SigAlg` and a
    /// `Signature` made with `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode_signed_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        key: &RsaSigningKey,
        algorithm: SignatureAlgorithm,
    ) -> SamlResult<String> {
        let mut query = Self::message_query(xml, relay_state, SamlMessageType::Request)?;
        query.push_str("&SigAlg=");
        query.push_str(&urlencoding::encode(algorithm.xml_dsig_uri()));

        let signature = key.sign(algorithm, query.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(signature);
        query.push_str("&Signature=");
        query.push_str(&urlencoding::encode(&encoded));

        Ok(append_query(destination, &query))
    }

    fn message_query(
        xml: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let mut query = format!("{}={}", message_type.form_param(), urlencoding::encode(&encoded));
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        Ok(query)
    }

    /// Decodes a message from a full redirect URL.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Decoding`] if the URL carries no SAML message or
    /// any encoding layer is invalid.
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed =
            url::Url::parse(url).map_err(|e| SamlError::Decoding(format!("invalid URL: {e}")))?;
        Self::decode_query(parsed.query().unwrap_or_default())
    }

    /// Decodes a message from a raw (still percent-encoded) query string.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Decoding`] if the query carries no SAML message
    /// or any encoding layer is invalid.
    pub fn decode_query(query: &str) -> SamlResult<DecodedMessage> {
        let mut message: Option<(SamlMessageType, &str)> = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for pair in query.split('&') {
            let (key, _) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "SAMLRequest" => message = Some((SamlMessageType::Request, pair)),
                "SAMLResponse" => message = Some((SamlMessageType::Response, pair)),
                "RelayState" => relay_state = Some(pair),
                "SigAlg" => sig_alg = Some(pair),
                "Signature" => signature = Some(pair),
                _ => {}
            }
        }

        let (message_type, message_pair) = message.ok_or_else(|| {
            SamlError::Decoding("no SAMLRequest or SAMLResponse parameter".to_string())
        })?;

        let signed_content = sig_alg.map(|alg| {
            let mut parts = vec![message_pair];
            parts.extend(relay_state);
            parts.push(alg);
            parts.join("&")
        });

        let encoded = param_value(message_pair)?;
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect::<String>())?;
        let xml = String::from_utf8(deflate_decompress(&compressed)?)
            .map_err(|e| SamlError::Decoding(format!("message is not UTF-8: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(param_value).transpose()?,
            signature: signature.map(param_value).transpose()?,
            sig_alg: sig_alg.map(param_value).transpose()?,
            signed_content,
        })
    }

    /// Verifies the detached signature of a decoded redirect message.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the message is unsigned,
    /// uses an unknown algorithm, or the signature does not verify with
    /// `certificate_der`.
    pub fn verify_signature(message: &DecodedMessage, certificate_der: &[u8]) -> SamlResult<()> {
        let (Some(sig_alg), Some(signature), Some(signed)) = (
            message.sig_alg.as_deref(),
            message.signature.as_deref(),
            message.signed_content.as_deref(),
        ) else {
            return Err(SamlError::SignatureInvalid("message is not signed".to_string()));
        };

        let algorithm = SignatureAlgorithm::from_xml_dsig_uri(sig_alg)
            .ok_or_else(|| SamlError::SignatureInvalid(format!("unsupported SigAlg {sig_alg}")))?;
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature)
            .map_err(|e| SamlError::SignatureInvalid(format!("invalid signature encoding: {e}")))?;

        verify_signature(certificate_der, algorithm, signed.as_bytes(), &signature)
            .map_err(|e| SamlError::SignatureInvalid(e.to_string()))
    }
}

fn append_query(destination: &str, query: &str) -> String {
    let separator = if destination.contains('?') { '&' } else { '?' };
    format!("{destination}{separator}{query}")
}

fn param_value(pair: &str) -> SamlResult<String> {
    let raw = pair.split_once('=').map_or("", |(_, v)| v);
    // Form encoding may turn spaces into '+'.
    let raw = raw.replace('+', "%20");
    urlencoding::decode(&raw)
        .map(|v| v.into_owned())
        .map_err(|e| SamlError::Decoding(format!("invalid URL encoding: {e}")))
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Decoding(format!("compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Decoding(format!("compression finish error: {e}")))
}

/// Decompresses DEFLATE data, refusing output above [`MAX_INFLATED_SIZE`].
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_SIZE as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Decoding(format!("decompression error: {e}")))?;
    if decompressed.len() > MAX_INFLATED_SIZE {
        return Err(SamlError::Decoding(format!(
            "inflated message exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssp_crypto::{generate_self_signed, CertificateSubject};

    #[test]
    fn encode_and_decode_request() {
        let xml = r#"<samlp:AuthnRequest>test content here</samlp:AuthnRequest>"#;
        let url =
            HttpRedirectBinding::encode_request(xml, "https://idp.example.com/sso", Some("state 123"))
                .unwrap();

        assert!(url.starts_with("https://idp.example.com/sso?SAMLRequest="));
        assert!(url.contains("&RelayState=state%20123"));

        let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state.as_deref(), Some("state 123"));
        assert!(decoded.signed_content.is_none());
    }

    #[test]
    fn url_with_existing_query() {
        let url = HttpRedirectBinding::encode_request(
            "<Test/>",
            "https://idp.example.com/sso?existing=param",
            None,
        )
        .unwrap();

        assert!(url.contains("?existing=param&SAMLRequest="));
        assert_eq!(HttpRedirectBinding::decode_url(&url).unwrap().xml, "<Test/>");
    }

    #[test]
    fn signed_request_verifies_with_signing_certificate() {
        let generated = generate_self_signed(&CertificateSubject::default(), 1).unwrap();
        let key = RsaSigningKey::from_der(&generated.private_key_der).unwrap();

        let url = HttpRedirectBinding::encode_signed_request(
            "<AuthnRequest/>",
            "https://idp.example.com/sso",
            Some("/profile"),
            &key,
            SignatureAlgorithm::RsaSha256,
        )
        .unwrap();

        let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(
            decoded.sig_alg.as_deref(),
            Some("http://www.w3.org/2001/04/xmldsig-more#rsa-sha256")
        );
        let signed = decoded.signed_content.as_deref().unwrap();
        assert!(signed.starts_with("SAMLRequest="));
        assert!(signed.contains("&RelayState=%2Fprofile&SigAlg="));
        HttpRedirectBinding::verify_signature(&decoded, &generated.certificate_der).unwrap();

        let mut tampered = decoded.clone();
        tampered.signed_content = Some(signed.replace("%2Fprofile", "%2Fadmin"));
        assert!(HttpRedirectBinding::verify_signature(&tampered, &generated.certificate_der).is_err());
    }

    #[test]
    fn missing_message_is_a_decoding_error() {
        let err = HttpRedirectBinding::decode_query("RelayState=abc").unwrap_err();
        assert!(matches!(err, SamlError::Decoding(_)));
    }

    #[test]
    fn inflate_bomb_is_refused() {
        let huge = vec![b'a'; MAX_INFLATED_SIZE + 10];
        let compressed = deflate_compress(&huge).unwrap();
        assert!(deflate_decompress(&compressed).is_err());
    }

    #[test]
    fn deflate_roundtrip() {
        let original = b"Test data for compression";
        let compressed = deflate_compress(original).unwrap();
        assert_eq!(deflate_decompress(&compressed).unwrap(), original);
    }
}
