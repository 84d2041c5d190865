//! SAML 2.0 Web Browser SSO service provider engine.
//!
//! This crate holds everything an SP needs to log users in through a SAML
//! identity provider, independent of any web framework:
//!
//! - **Credentials**: the SP key pair, loaded from PEM files or generated
//! - **Metadata**: typed entity descriptors, parsing, serialization and the
//!   single configured IdP source (file, URL or manual values)
//! - **AuthnRequests**: built per login and encoded for the Redirect or POST
//!   binding, signed with the SP key
//! - **Response validation**: decoding, hardened parsing, XML-DSig
//!   verification and the protocol checks that turn a Response into a
//!   [`ValidatedIdentity`]
//! - **Session projection**: an immutable [`AuthenticatedSession`]
//!
//! # Architecture
//!
//! - [`xml`] - hardened parsing, Exclusive C14N, pretty printing
//! - [`signature`] - XML signature creation and verification
//! - [`bindings`] - HTTP-POST and HTTP-Redirect codecs
//! - [`types`] - SAML constants and message types
//! - [`metadata`] - entity descriptors and IdP sources
//! - [`request`] - AuthnRequest builder
//! - [`validator`] - Response validator
//! - [`replay`] - outstanding request tracking
//! - [`session`] - session projection
//! - [`error`] - error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ssp_protocol_saml::{ResponseValidator, ServiceProviderConfig};
//!
//! let sp = Arc::new(ServiceProviderConfig::new(entity_id, acs_url));
//! let idp = Arc::new(IdpSource::Url(url).resolve(DEFAULT_FETCH_TIMEOUT).await?);
//! let identity = ResponseValidator::new(sp, idp).validate(&saml_response)?;
//! let session = ssp_protocol_saml::session::project(&identity);
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod config;
pub mod credentials;
pub mod error;
pub mod metadata;
pub mod replay;
pub mod request;
pub mod session;
pub mod signature;
pub mod types;
pub mod validator;
pub mod xml;

pub use config::ServiceProviderConfig;
pub use credentials::{Certificate, KeySource, SigningCredentials};
pub use error::{ConfigErrorKind, ConfigurationError, ErrorKind, SamlError, SamlFailure, SamlResult};
pub use metadata::{parse_idp_metadata, parse_metadata, serialize_metadata, EntityDescriptor, IdpSource};
pub use replay::PendingRequests;
pub use request::{build_authn_request, EncodedRequest};
pub use session::AuthenticatedSession;
pub use types::*;
pub use validator::{ResponseValidator, ValidatedIdentity};
