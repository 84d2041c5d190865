//! Server configuration.
//!
//! Values come from an optional `config.yaml` in the working directory and
//! from environment variables (a `.env` file is loaded first). Environment
//! variables take precedence over the file.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use ssp_protocol_saml::{
    ConfigErrorKind, ConfigurationError, IdpSource, KeySource, SamlResult, ServiceProviderConfig,
};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "config.yaml";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Largest accepted clock skew, one day.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 24 * 60 * 60;

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Public base URL, used for the SP endpoints.
    pub base_url: String,
    /// SP settings.
    pub sp: SpSettings,
    /// IdP settings, exactly one source must be set.
    pub idp: IdpSettings,
    /// Debug switches.
    pub debug: DebugSettings,
}

/// SP settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpSettings {
    /// SP entity ID.
    pub entity_id: String,
    /// PEM private key; a key pair is generated when neither file is set.
    pub key_file: Option<PathBuf>,
    /// PEM certificate matching `key_file`.
    pub cert_file: Option<PathBuf>,
    /// Tolerated clock skew in seconds.
    pub clock_skew_seconds: i64,
    /// Accept only responses to AuthnRequests issued by this process.
    pub correlate_requests: bool,
}

/// IdP settings as configured, before source selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdpSettings {
    /// Local metadata file.
    pub metadata_file: Option<PathBuf>,
    /// Metadata URL.
    pub metadata_url: Option<String>,
    /// Manual entity ID.
    pub entity_id: Option<String>,
    /// Manual SSO URL.
    pub sso_url: Option<String>,
    /// Manual signing certificate (PEM or base64 DER).
    pub certificate: Option<String>,
}

/// Debug switches. They only control what is shown and logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugSettings {
    /// Show error details and the `/debug` page.
    pub enabled: bool,
    /// Log raw SAML messages.
    pub log_saml_messages: bool,
}

/// Shape of `config.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    /// `sp:` section.
    pub sp: SpFile,
    /// `idp:` section.
    pub idp: IdpFile,
    /// `server:` section.
    pub server: ServerFile,
    /// `debug:` section.
    pub debug: DebugFile,
}

/// `sp:` section of `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpFile {
    /// SP entity ID.
    pub entity_id: Option<String>,
    /// Private key path.
    pub key_file: Option<PathBuf>,
    /// Certificate path.
    pub cert_file: Option<PathBuf>,
    /// Clock skew in seconds.
    pub clock_skew_seconds: Option<i64>,
    /// Request correlation switch.
    pub correlate_requests: Option<bool>,
}

/// `idp:` section of `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdpFile {
    /// Metadata file path.
    pub metadata_file: Option<PathBuf>,
    /// Metadata URL.
    pub metadata_url: Option<String>,
    /// Manual entity ID.
    pub entity_id: Option<String>,
    /// Manual SSO URL.
    pub sso_url: Option<String>,
    /// Manual certificate.
    pub certificate: Option<String>,
}

/// `server:` section of `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerFile {
    /// Bind address.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Public base URL.
    pub base_url: Option<String>,
}

/// `debug:` section of `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebugFile {
    /// Debug page and error details.
    pub enabled: Option<bool>,
    /// Raw message logging.
    pub log_saml_messages: Option<bool>,
}

impl FileConfig {
    /// Reads `path` if it exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file exists but cannot be read
    /// or is not valid YAML.
    pub fn read(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            invalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content).map_err(|e| {
            invalid(format!("{}: {}", path.display(), e.message))
        })
    }

    /// Parses YAML text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for invalid YAML.
    pub fn parse(content: &str) -> Result<Self, ConfigurationError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| invalid(format!("invalid configuration file: {e}")))
    }
}

impl ServerConfig {
    /// Loads `.env`, `config.yaml` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for unreadable files or invalid
    /// values.
    pub fn load() -> Result<Self, ConfigurationError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let file = FileConfig::read(Path::new(CONFIG_FILE))?;
        Self::from_sources(file, |name| std::env::var(name).ok())
    }

    /// Merges file values with variables returned by `env`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for invalid numbers or booleans.
    pub fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => parse_value("PORT", &raw)?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };
        let host = var("HOST")
            .or(file.server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let base_url = var("BASE_URL")
            .or(file.server.base_url)
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        let base_url = base_url.trim_end_matches('/').to_string();

        let entity_id = var("SP_ENTITY_ID")
            .or(file.sp.entity_id)
            .unwrap_or_else(|| format!("{base_url}/metadata"));
        let clock_skew_seconds = match var("SP_CLOCK_SKEW_SECONDS") {
            Some(raw) => parse_value("SP_CLOCK_SKEW_SECONDS", &raw)?,
            None => file.sp.clock_skew_seconds.unwrap_or(0),
        };
        if !(0..=MAX_CLOCK_SKEW_SECONDS).contains(&clock_skew_seconds) {
            return Err(invalid(format!(
                "SP_CLOCK_SKEW_SECONDS must be between 0 and {MAX_CLOCK_SKEW_SECONDS}, got {clock_skew_seconds}"
            )));
        }
        let correlate_requests = match var("SP_CORRELATE_REQUESTS") {
            Some(raw) => parse_bool("SP_CORRELATE_REQUESTS", &raw)?,
            None => file.sp.correlate_requests.unwrap_or(true),
        };

        let sp = SpSettings {
            entity_id,
            key_file: var("SP_KEY_FILE").map(PathBuf::from).or(file.sp.key_file),
            cert_file: var("SP_CERT_FILE").map(PathBuf::from).or(file.sp.cert_file),
            clock_skew_seconds,
            correlate_requests,
        };

        let idp = IdpSettings {
            metadata_file: var("IDP_METADATA_FILE")
                .map(PathBuf::from)
                .or(file.idp.metadata_file),
            metadata_url: var("IDP_METADATA_URL").or(file.idp.metadata_url),
            entity_id: var("IDP_ENTITY_ID").or(file.idp.entity_id),
            sso_url: var("IDP_SSO_URL").or(file.idp.sso_url),
            certificate: var("IDP_CERTIFICATE").or(file.idp.certificate),
        };

        let debug = DebugSettings {
            enabled: match var("DEBUG") {
                Some(raw) => parse_bool("DEBUG", &raw)?,
                None => file.debug.enabled.unwrap_or(false),
            },
            log_saml_messages: match var("DEBUG_SAML") {
                Some(raw) => parse_bool("DEBUG_SAML", &raw)?,
                None => file.debug.log_saml_messages.unwrap_or(false),
            },
        };

        Ok(Self {
            host,
            port,
            base_url,
            sp,
            idp,
            debug,
        })
    }

    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if host and port do not form an
    /// address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigurationError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(format!("invalid bind address {}:{}: {e}", self.host, self.port)))?
            .next()
            .ok_or_else(|| invalid(format!("{} does not resolve to an address", self.host)))
    }

    /// ACS URL derived from the base URL.
    #[must_use]
    pub fn acs_url(&self) -> String {
        format!("{}/acs", self.base_url)
    }

    /// SLO URL derived from the base URL.
    #[must_use]
    pub fn slo_url(&self) -> String {
        format!("{}/slo", self.base_url)
    }

    /// Metadata URL derived from the base URL.
    #[must_use]
    pub fn metadata_url(&self) -> String {
        format!("{}/metadata", self.base_url)
    }

    /// Settings for the SAML engine.
    #[must_use]
    pub fn service_provider(&self) -> ServiceProviderConfig {
        ServiceProviderConfig::new(&self.sp.entity_id, self.acs_url())
            .with_slo_url(self.slo_url())
            .with_clock_skew(Duration::try_seconds(self.sp.clock_skew_seconds).unwrap_or_default())
    }

    /// Where the SP key pair comes from.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if only one of the key and
    /// certificate files is set.
    pub fn key_source(&self) -> Result<KeySource, ConfigurationError> {
        match (&self.sp.key_file, &self.sp.cert_file) {
            (Some(key_path), Some(cert_path)) => Ok(KeySource::Files {
                key_path: key_path.clone(),
                cert_path: cert_path.clone(),
            }),
            (None, None) => Ok(KeySource::Generate),
            _ => Err(invalid("SP_KEY_FILE and SP_CERT_FILE must be set together")
                .with_remediation("Set both files, or neither to generate a self-signed key pair at startup.")),
        }
    }

    /// Selects the IdP source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless exactly one source is set.
    pub fn idp_source(&self) -> SamlResult<IdpSource> {
        IdpSource::from_options(
            self.idp.metadata_file.clone(),
            self.idp.metadata_url.as_deref(),
            self.idp.entity_id.clone(),
            self.idp.sso_url.clone(),
            self.idp.certificate.as_deref(),
        )
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigurationError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| invalid(format!("{name}={raw} is not valid: {e}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigurationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(format!("{name}={raw} is not a boolean"))),
    }
}

fn invalid(message: impl Into<String>) -> ConfigurationError {
    ConfigurationError::new(ConfigErrorKind::InvalidValue, message)
}
