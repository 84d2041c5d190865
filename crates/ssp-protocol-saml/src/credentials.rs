//! Certificate and key material.
//!
//! The SP signing credentials are produced once at startup, either from a
//! PEM key/certificate pair on disk or freshly generated, and are then shared
//! read-only (`Arc<SigningCredentials>`) by every request. IdP trust anchors
//! are plain [`Certificate`] values taken from metadata.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use ssp_crypto::certificate::subject_public_key;
use ssp_crypto::{generate_self_signed, CertificateInfo, CertificateSubject, RsaSigningKey, SignatureError};

use crate::error::{ConfigErrorKind, ConfigurationError, SamlResult};

/// Validity of a generated SP certificate.
pub const GENERATED_CERT_VALIDITY_DAYS: u32 = 365;

/// A DER encoded X.509 certificate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wraps DER bytes after checking that they parse as a certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an X.509 certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self, SignatureError> {
        CertificateInfo::from_der(&der)?;
        Ok(Self { der })
    }

    /// Parses either a PEM `CERTIFICATE` block or bare base64 DER, the form
    /// used inside `ds:X509Certificate` and in environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not contain a certificate.
    pub fn from_pem_or_base64(text: &str) -> Result<Self, SignatureError> {
        let der = match pem_block(text, "CERTIFICATE") {
            Some(der) => der?,
            None => decode_base64(text)?,
        };
        Self::from_der(der)
    }

    /// Returns the DER bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the base64 DER, as embedded in metadata.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Returns the certificate as a PEM block.
    #[must_use]
    pub fn to_pem(&self) -> String {
        let encoded = self.to_base64();
        let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
        for line in encoded.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
        pem
    }

    /// Returns subject and validity information.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate cannot be parsed.
    pub fn info(&self) -> Result<CertificateInfo, SignatureError> {
        CertificateInfo::from_der(&self.der)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.info() {
            Ok(info) => f
                .debug_struct("Certificate")
                .field("subject", &info.subject)
                .field("not_after", &info.not_after)
                .finish(),
            Err(_) => f.debug_struct("Certificate").field("len", &self.der.len()).finish(),
        }
    }
}

/// Where the SP key pair comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// PEM files on disk.
    Files {
        /// Private key path (PKCS#8 or PKCS#1 PEM).
        key_path: PathBuf,
        /// Certificate path (PEM).
        cert_path: PathBuf,
    },
    /// A self-signed RSA-2048 certificate generated at startup.
    Generate,
}

/// The SP signing key and matching certificate.
pub struct SigningCredentials {
    key: RsaSigningKey,
    certificate: Certificate,
}

impl SigningCredentials {
    /// Loads or generates credentials according to `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if files are missing or unusable.
    pub fn load(source: &KeySource) -> SamlResult<Self> {
        match source {
            KeySource::Files {
                key_path,
                cert_path,
            } => Self::from_files(key_path, cert_path),
            KeySource::Generate => Self::generate(),
        }
    }

    /// Reads a PEM key and certificate from disk.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the missing file, with the
    /// `openssl` command that creates a suitable pair as remediation.
    pub fn from_files(key_path: &Path, cert_path: &Path) -> SamlResult<Self> {
        let key_pem = std::fs::read_to_string(key_path).map_err(|e| {
            ConfigurationError::new(
                ConfigErrorKind::MissingKeyFile,
                format!("SP private key not readable at {}: {e}", key_path.display()),
            )
            .with_remediation(openssl_remediation(key_path, cert_path))
        })?;
        let cert_pem = std::fs::read_to_string(cert_path).map_err(|e| {
            ConfigurationError::new(
                ConfigErrorKind::MissingCertificateFile,
                format!("SP certificate not readable at {}: {e}", cert_path.display()),
            )
            .with_remediation(openssl_remediation(key_path, cert_path))
        })?;

        tracing::info!(
            key = %key_path.display(),
            certificate = %cert_path.display(),
            "loaded SP key pair from files"
        );
        Self::from_pem(&key_pem, &cert_pem)
    }

    /// Builds credentials from PEM text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if either part does not parse or the
    /// key does not belong to the certificate.
    pub fn from_pem(key_pem: &str, cert_pem: &str) -> SamlResult<Self> {
        let key_der = pem_block(key_pem, "PRIVATE KEY")
            .or_else(|| pem_block(key_pem, "RSA PRIVATE KEY"))
            .ok_or_else(|| invalid_material("no PRIVATE KEY or RSA PRIVATE KEY PEM block found"))?
            .map_err(|e| invalid_material(format!("private key: {e}")))?;
        let key = RsaSigningKey::from_der(&key_der).map_err(|e| invalid_material(e.to_string()))?;
        let certificate = Certificate::from_pem_or_base64(cert_pem)
            .map_err(|e| invalid_material(format!("certificate: {e}")))?;
        Self::new(key, certificate)
    }

    /// Generates a fresh self-signed RSA-2048/SHA-256 key pair valid for one
    /// year.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> SamlResult<Self> {
        tracing::info!("generating self-signed certificate for SP");
        let generated =
            generate_self_signed(&CertificateSubject::default(), GENERATED_CERT_VALIDITY_DAYS)?;
        let key = RsaSigningKey::from_der(&generated.private_key_der)?;
        let certificate = Certificate::from_der(generated.certificate_der)?;
        Self::new(key, certificate)
    }

    fn new(key: RsaSigningKey, certificate: Certificate) -> SamlResult<Self> {
        let cert_key =
            subject_public_key(certificate.der()).map_err(|e| invalid_material(e.to_string()))?;
        if cert_key != key.public_key_der() {
            return Err(invalid_material("private key does not match the certificate").into());
        }
        Ok(Self { key, certificate })
    }

    /// Returns the signing key.
    #[must_use]
    pub fn signing_key(&self) -> &RsaSigningKey {
        &self.key
    }

    /// Returns the certificate published in SP metadata.
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Returns the key and certificate together.
    #[must_use]
    pub fn signing_key_pair(&self) -> (&RsaSigningKey, &Certificate) {
        (&self.key, &self.certificate)
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

fn invalid_material(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::new(ConfigErrorKind::InvalidKeyMaterial, message)
}

fn openssl_remediation(key_path: &Path, cert_path: &Path) -> String {
    format!(
        "Create a self-signed certificate with:\n\n  \
         mkdir -p certs\n  \
         openssl req -x509 -newkey rsa:2048 \\\n    \
         -keyout {} \\\n    \
         -out {} \\\n    \
         -days 365 -nodes \\\n    \
         -subj \"/CN=Simple SAML SP/O=Test Organization\"\n\n\
         Then restart the application.",
        key_path.display(),
        cert_path.display()
    )
}

/// Extracts and decodes the first PEM block with `label`, if present.
fn pem_block(text: &str, label: &str) -> Option<Result<Vec<u8>, SignatureError>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");
    let start = text.find(&begin)? + begin.len();
    let body = &text[start..];
    let stop = body.find(&end)?;
    Some(decode_base64(&body[..stop]))
}

fn decode_base64(text: &str) -> Result<Vec<u8>, SignatureError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| SignatureError::InvalidCertificate(format!("invalid base64: {e}")))
}
