//! Digital signature operations.
//!
//! Signing is RSA only: the SP key is always an RSA key. Verification also
//! accepts ECDSA because identity providers may sign with EC keys.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey, VerificationAlgorithm},
};
use thiserror::Error;

use crate::algorithm::SignatureAlgorithm;
use crate::certificate;

/// Error type for signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Invalid key format.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Algorithm not supported.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

/// An RSA private key used to sign outbound SAML messages.
///
/// The parsed key is kept for the lifetime of the value so that each
/// signature does not pay for DER parsing again.
#[derive(Debug)]
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
}

impl RsaSigningKey {
    /// Parses a PKCS#8 or PKCS#1 DER encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid RSA key of at least
    /// 2048 bits.
    pub fn from_der(key_der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_pkcs8(key_der)
            .or_else(|_| RsaKeyPair::from_der(key_der))
            .map_err(|e| SignatureError::InvalidKey(format!("invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Returns the modulus length in bits.
    #[must_use]
    pub fn key_size_bits(&self) -> usize {
        self.key_pair.public_modulus_len() * 8
    }

    /// Returns the PKCS#1 `RSAPublicKey` DER bytes.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Signs `data` with the given algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error for non-RSA or legacy algorithms, or if signing fails.
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let padding: &'static dyn signature::RsaEncoding = match algorithm {
            SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_SHA256,
            SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_SHA384,
            SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
            other => {
                return Err(SignatureError::UnsupportedAlgorithm(format!(
                    "cannot sign with {other}"
                )))
            }
        };

        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|e| SignatureError::Signing(format!("RSA signing failed: {e}")))?;

        Ok(sig)
    }
}

/// Verifies `sig` over `data` with the public key of a DER encoded X.509
/// certificate.
///
/// # Errors
///
/// Returns [`SignatureError::Verification`] if the signature does not match,
/// or an error describing why the certificate or algorithm is unusable.
pub fn verify_signature(
    certificate_der: &[u8],
    algorithm: SignatureAlgorithm,
    data: &[u8],
    sig: &[u8],
) -> Result<(), SignatureError> {
    let public_key = certificate::subject_public_key(certificate_der)?;

    let verification_alg: &'static dyn VerificationAlgorithm = match algorithm {
        SignatureAlgorithm::RsaSha1Legacy => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
        SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        // XML-DSig carries ECDSA signatures as raw r || s.
        SignatureAlgorithm::EcdsaP256Sha256 => &signature::ECDSA_P256_SHA256_FIXED,
        SignatureAlgorithm::EcdsaP384Sha384 => &signature::ECDSA_P384_SHA384_FIXED,
        SignatureAlgorithm::EcdsaP521Sha512 => &signature::ECDSA_P521_SHA512_FIXED,
    };

    UnparsedPublicKey::new(verification_alg, &public_key)
        .verify(data, sig)
        .map_err(|_| SignatureError::Verification)
}
