//! # ssp-server
//!
//! A small SAML service provider web application built on
//! `ssp-protocol-saml`.
//!
//! It publishes SP metadata, sends users to the configured IdP, consumes the
//! signed Response at `/acs` and keeps the resulting login in an in-memory
//! session. Configuration comes from `config.yaml` and the environment, see
//! [`ServerConfig`].
//!
//! ## Usage
//!
//! ```ignore
//! use ssp_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::load()?;
//! let server = Server::new(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod session;
pub mod state;
pub mod templates;

pub use config::ServerConfig;
pub use router::create_router;
pub use state::AppState;

use std::time::Duration;

use anyhow::Context;
use axum::Router;
use ssp_protocol_saml::metadata::DEFAULT_FETCH_TIMEOUT;
use ssp_protocol_saml::SigningCredentials;
use tokio::net::TcpListener;

use crate::session::session_cleanup_task;

/// Upper bound on resolving the IdP at startup.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// The SP web server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Loads the SP key pair and resolves the IdP.
    ///
    /// # Errors
    ///
    /// Fails on invalid key files, an ambiguous or missing IdP source, or
    /// IdP metadata that cannot be fetched or parsed within
    /// [`STARTUP_TIMEOUT`].
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let key_source = config.key_source()?;
        let credentials = SigningCredentials::load(&key_source)?;
        let certificate = credentials.certificate().info()?;
        tracing::info!(
            subject = %certificate.subject,
            not_after = %certificate.not_after,
            "SP credentials loaded"
        );

        let source = config.idp_source()?;
        tracing::info!(source = %source.describe(), "resolving identity provider");
        let idp = tokio::time::timeout(STARTUP_TIMEOUT, source.resolve(DEFAULT_FETCH_TIMEOUT))
            .await
            .with_context(|| format!("timed out resolving {}", source.describe()))??;
        tracing::info!(
            entity_id = %idp.entity_id,
            certificates = idp.signing_certificates.len(),
            "identity provider loaded"
        );

        Ok(Self {
            state: AppState::new(config, credentials, idp),
        })
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Builds the router without starting the server.
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serves requests until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Fails if the listen address is invalid or cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.state.config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        tokio::spawn(session_cleanup_task(self.state.sessions.clone()));
        if let Some(pending) = self.state.pending.clone() {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    pending.purge_expired();
                }
            });
        }

        tracing::info!(
            %addr,
            base_url = %self.state.config.base_url,
            entity_id = %self.state.sp.entity_id,
            "server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("server shutdown complete");
        Ok(())
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
