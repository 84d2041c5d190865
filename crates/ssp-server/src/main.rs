//! # ssp-server
//!
//! Entry point for the SAML service provider.

#![forbid(unsafe_code)]

use std::process::ExitCode;

use ssp_protocol_saml::{ConfigurationError, SamlError};
use ssp_server::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "startup failed");
            if let Some(remediation) = remediation(&err) {
                eprintln!("\n{remediation}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn start() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    tracing::info!(port = config.port, debug = config.debug.enabled, "starting SAML SP");
    Server::new(config).await?.run().await
}

fn remediation(err: &anyhow::Error) -> Option<&str> {
    err.chain().find_map(|cause| {
        if let Some(config) = cause.downcast_ref::<ConfigurationError>() {
            config.remediation.as_deref()
        } else {
            cause.downcast_ref::<SamlError>().and_then(SamlError::remediation)
        }
    })
}
