//! Application state shared by all handlers.

use std::sync::Arc;

use ssp_protocol_saml::{
    serialize_metadata, EntityDescriptor, PendingRequests, ResponseValidator,
    ServiceProviderConfig, SigningCredentials,
};

use crate::config::ServerConfig;
use crate::session::SessionStore;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// SAML settings derived from `config`.
    pub sp: Arc<ServiceProviderConfig>,
    /// SP key pair, fixed for the life of the process.
    pub credentials: Arc<SigningCredentials>,
    /// The trusted IdP.
    pub idp: Arc<EntityDescriptor>,
    /// Response validator bound to `sp` and `idp`.
    pub validator: ResponseValidator,
    /// Outstanding AuthnRequests, when correlation is on.
    pub pending: Option<Arc<PendingRequests>>,
    /// Login sessions.
    pub sessions: SessionStore,
    /// Serialized SP metadata.
    pub sp_metadata: Arc<str>,
}

impl AppState {
    /// Wires the state from loaded configuration, credentials and IdP.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        credentials: SigningCredentials,
        idp: EntityDescriptor,
    ) -> Self {
        let sp = Arc::new(config.service_provider());
        let idp = Arc::new(idp);
        let sp_metadata: Arc<str> =
            serialize_metadata(&EntityDescriptor::service_provider(&sp, &credentials)).into();

        let pending = config
            .sp
            .correlate_requests
            .then(|| Arc::new(PendingRequests::default()));
        let mut validator = ResponseValidator::new(Arc::clone(&sp), Arc::clone(&idp));
        if let Some(pending) = &pending {
            validator = validator.with_pending_requests(Arc::clone(pending));
        }

        Self {
            config: Arc::new(config),
            sp,
            credentials: Arc::new(credentials),
            idp,
            validator,
            pending,
            sessions: SessionStore::new(),
            sp_metadata,
        }
    }

    /// Returns true if debug output is enabled.
    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.config.debug.enabled
    }

    /// Returns true if cookies must carry the `Secure` flag.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.config.base_url.starts_with("https://")
    }

    /// Returns true if raw SAML messages may be logged.
    #[must_use]
    pub fn log_saml_messages(&self) -> bool {
        self.config.debug.log_saml_messages
    }
}
