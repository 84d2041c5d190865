//! # ssp-crypto
//!
//! Cryptographic operations for the Simple SAML SP using aws-lc-rs.
//!
//! ## Algorithms
//!
//! SAML 2.0 deployments overwhelmingly sign with RSA PKCS#1 v1.5 and
//! SHA-256, so that is the default everywhere in this crate. SHA-1 based
//! algorithms are only reachable through the `*_legacy` variants and callers
//! must opt into them explicitly.
//!
//! ## Contents
//!
//! - [`hash`]: message digests
//! - [`signature`]: RSA and ECDSA signing and verification
//! - [`random`]: secure identifiers
//! - [`certificate`]: self-signed certificate generation and inspection

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algorithm;
pub mod certificate;
pub mod hash;
pub mod random;
pub mod signature;

pub use algorithm::{HashAlgorithm, SignatureAlgorithm};
pub use certificate::{generate_self_signed, CertificateInfo, CertificateSubject, SelfSignedCertificate};
pub use hash::{constant_time_eq, digest, sha256, sha384, sha512};
pub use random::{generate_message_id, generate_session_id, random_bytes};
pub use signature::{verify_signature, RsaSigningKey, SignatureError};
