//! Cryptographically secure random generation.
//!
//! Used for SAML message identifiers and local session identifiers. Both
//! must be unguessable, so everything here draws from the thread-local CSPRNG.

use std::fmt::Write;

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Number of random bytes in a SAML message ID (160 bits).
pub const MESSAGE_ID_BYTES: usize = 20;

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a lowercase hex string from `byte_len` random bytes.
#[must_use]
pub fn random_hex(byte_len: usize) -> String {
    random_bytes(byte_len)
        .iter()
        .fold(String::with_capacity(byte_len * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

/// Generates a cryptographically secure random alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a SAML message identifier.
///
/// The value is an `xs:ID`, so it must be an NCName: it starts with an
/// underscore followed by 160 bits of randomness rendered as hex.
#[must_use]
pub fn generate_message_id() -> String {
    format!("_{}", random_hex(MESSAGE_ID_BYTES))
}

/// Generates a local session identifier.
///
/// 32 alphanumeric characters give roughly 190 bits of entropy.
#[must_use]
pub fn generate_session_id() -> String {
    random_alphanumeric(32)
}
