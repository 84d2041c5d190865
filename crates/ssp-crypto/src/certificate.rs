//! X.509 certificate handling.
//!
//! Provides ephemeral self-signed certificate generation for the SP signing
//! key and read-only inspection of certificates received from metadata.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rcgen::{CertificateParams, DnType, KeyPair, RsaKeySize, PKCS_RSA_SHA256};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::signature::SignatureError;

/// Subject of a generated certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    /// Common name (CN).
    pub common_name: String,
    /// Organization (O).
    pub organization: String,
}

impl Default for CertificateSubject {
    fn default() -> Self {
        Self {
            common_name: "Simple SAML SP".to_string(),
            organization: "Test Organization".to_string(),
        }
    }
}

/// A freshly generated RSA key pair and its self-signed certificate.
#[derive(Debug, Clone)]
pub struct SelfSignedCertificate {
    /// Certificate in DER form.
    pub certificate_der: Vec<u8>,
    /// Certificate in PEM form.
    pub certificate_pem: String,
    /// PKCS#8 private key in DER form.
    pub private_key_der: Vec<u8>,
    /// PKCS#8 private key in PEM form.
    pub private_key_pem: String,
}

/// Generates an RSA-2048 key pair and a self-signed SHA-256 certificate
/// valid for `validity_days` days starting today.
///
/// # Errors
///
/// Returns an error if key generation or certificate signing fails.
pub fn generate_self_signed(
    subject: &CertificateSubject,
    validity_days: u32,
) -> Result<SelfSignedCertificate, SignatureError> {
    let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_2048)
        .map_err(|e| SignatureError::KeyGeneration(format!("RSA key generation failed: {e}")))?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, subject.common_name.clone());
    params
        .distinguished_name
        .push(DnType::OrganizationName, subject.organization.clone());

    let not_before = Utc::now();
    let not_after = not_before + Duration::days(i64::from(validity_days));
    params.not_before = rcgen::date_time_ymd(
        not_before.year(),
        not_before.month() as u8,
        not_before.day() as u8,
    );
    params.not_after = rcgen::date_time_ymd(
        not_after.year(),
        not_after.month() as u8,
        not_after.day() as u8,
    );

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| SignatureError::KeyGeneration(format!("certificate signing failed: {e}")))?;

    Ok(SelfSignedCertificate {
        certificate_der: cert.der().to_vec(),
        certificate_pem: cert.pem(),
        private_key_der: key_pair.serialize_der(),
        private_key_pem: key_pair.serialize_pem(),
    })
}

/// Summary of a certificate, used for logging and the metadata page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    /// Parses a DER encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an X.509 certificate.
    pub fn from_der(certificate_der: &[u8]) -> Result<Self, SignatureError> {
        let cert = parse(certificate_der)?;
        let validity = cert.validity();
        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before: timestamp(validity.not_before.timestamp())?,
            not_after: timestamp(validity.not_after.timestamp())?,
        })
    }

    /// Returns true if `now` lies inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// Extracts the raw subject public key (PKCS#1 for RSA, an uncompressed
/// point for EC) from a DER encoded certificate.
///
/// # Errors
///
/// Returns an error if the bytes are not an X.509 certificate.
pub fn subject_public_key(certificate_der: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let cert = parse(certificate_der)?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

fn parse(certificate_der: &[u8]) -> Result<X509Certificate<'_>, SignatureError> {
    let (rest, cert) = X509Certificate::from_der(certificate_der)
        .map_err(|e| SignatureError::InvalidCertificate(e.to_string()))?;
    if !rest.is_empty() {
        return Err(SignatureError::InvalidCertificate(
            "trailing data after certificate".to_string(),
        ));
    }
    Ok(cert)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, SignatureError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| SignatureError::InvalidCertificate(format!("invalid timestamp {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_certificate_has_subject_and_one_year_validity() {
        let generated = generate_self_signed(&CertificateSubject::default(), 365).unwrap();
        assert!(generated.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(generated.private_key_pem.contains("BEGIN PRIVATE KEY"));

        let info = CertificateInfo::from_der(&generated.certificate_der).unwrap();
        assert!(info.subject.contains("CN=Simple SAML SP"));
        assert!(info.subject.contains("O=Test Organization"));
        assert_eq!(info.subject, info.issuer);

        let days = (info.not_after - info.not_before).num_days();
        assert!((364..=366).contains(&days), "validity was {days} days");
        assert!(info.is_valid_at(Utc::now()));
    }

    #[test]
    fn each_generation_yields_a_new_key() {
        let a = generate_self_signed(&CertificateSubject::default(), 1).unwrap();
        let b = generate_self_signed(&CertificateSubject::default(), 1).unwrap();
        assert_ne!(a.private_key_der, b.private_key_der);
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        assert!(matches!(
            subject_public_key(b"garbage"),
            Err(SignatureError::InvalidCertificate(_))
        ));
    }
}
