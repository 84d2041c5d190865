//! XML Signature support for SAML.
//!
//! [`verify_signed_xml`] is the single entry point the rest of the engine
//! uses to decide whether an element is authentic; [`XmlSigner`] produces the
//! enveloped signatures this SP attaches to POST-binding AuthnRequests.
//!
//! Only the profile of XML-DSig that SAML actually uses is accepted: one
//! same-document reference to the enclosing element, the enveloped-signature
//! transform, and Exclusive C14N.

mod signer;
mod verify;

pub use signer::*;
pub use verify::*;
