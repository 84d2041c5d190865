//! Where the IdP descriptor comes from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use super::{parse_idp_metadata, EntityDescriptor, METADATA_PARSE_LIMITS};
use crate::credentials::Certificate;
use crate::error::{ConfigErrorKind, ConfigurationError, SamlError, SamlResult};

/// Timeout of a metadata HTTP fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The single configured origin of IdP metadata, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdpSource {
    /// A metadata XML file on disk.
    File(PathBuf),
    /// A metadata URL fetched over HTTP(S).
    Url(Url),
    /// Values configured by hand.
    Manual {
        /// IdP entity ID.
        entity_id: String,
        /// SSO URL, used for both bindings.
        sso_url: String,
        /// IdP signing certificate.
        certificate: Certificate,
    },
}

impl IdpSource {
    /// Picks the source from optional settings. Exactly one of a metadata
    /// file, a metadata URL, or the manual triple must be configured.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when no source or more than one is
    /// configured, the manual triple is incomplete, or a value is invalid.
    pub fn from_options(
        metadata_file: Option<PathBuf>,
        metadata_url: Option<&str>,
        entity_id: Option<String>,
        sso_url: Option<String>,
        certificate: Option<&str>,
    ) -> SamlResult<Self> {
        let manual = entity_id.is_some() || sso_url.is_some() || certificate.is_some();
        let configured = usize::from(metadata_file.is_some())
            + usize::from(metadata_url.is_some())
            + usize::from(manual);

        if configured == 0 {
            return Err(ConfigurationError::new(
                ConfigErrorKind::NoIdpSource,
                "IdP configuration required",
            )
            .with_remediation(
                "Choose one of:\n\n  \
                 1. Set idp.metadataFile in config.yaml (or IDP_METADATA_FILE) to load from a local file\n  \
                 2. Set IDP_METADATA_URL to fetch from a URL\n  \
                 3. Set IDP_ENTITY_ID + IDP_SSO_URL + IDP_CERTIFICATE for manual configuration",
            )
            .into());
        }
        if configured > 1 {
            return Err(ConfigurationError::new(
                ConfigErrorKind::MultipleIdpSources,
                "more than one IdP source is configured",
            )
            .with_remediation(
                "Keep exactly one of the metadata file, the metadata URL, or the manual IDP_ENTITY_ID/IDP_SSO_URL/IDP_CERTIFICATE settings.",
            )
            .into());
        }

        if let Some(path) = metadata_file {
            return Ok(Self::File(path));
        }

        if let Some(raw) = metadata_url {
            let url = Url::parse(raw).map_err(|e| {
                ConfigurationError::new(
                    ConfigErrorKind::InvalidValue,
                    format!("invalid IdP metadata URL {raw}: {e}"),
                )
            })?;
            return Ok(Self::Url(url));
        }

        let (Some(entity_id), Some(sso_url)) = (entity_id, sso_url) else {
            return Err(ConfigurationError::new(
                ConfigErrorKind::IncompleteManualIdp,
                "manual IdP configuration needs both an entity ID and an SSO URL",
            )
            .with_remediation("Set IDP_ENTITY_ID, IDP_SSO_URL and IDP_CERTIFICATE together.")
            .into());
        };
        let Some(certificate) = certificate else {
            return Err(ConfigurationError::new(
                ConfigErrorKind::IncompleteManualIdp,
                "IdP certificate is required for manual configuration",
            )
            .with_remediation("Set IDP_CERTIFICATE to the IdP signing certificate (PEM or base64 DER).")
            .into());
        };
        let certificate = Certificate::from_pem_or_base64(certificate).map_err(|e| {
            ConfigurationError::new(
                ConfigErrorKind::InvalidValue,
                format!("IdP certificate is not usable: {e}"),
            )
        })?;

        Ok(Self::Manual {
            entity_id,
            sso_url,
            certificate,
        })
    }

    /// Returns a short description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => format!("file {}", path.display()),
            Self::Url(url) => format!("url {url}"),
            Self::Manual { entity_id, .. } => format!("manual configuration for {entity_id}"),
        }
    }

    /// Loads and parses the IdP descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for a missing metadata file,
    /// [`SamlError::MetadataFetch`] if the file cannot be read or the HTTP
    /// fetch fails, times out or returns a non-2xx status, and
    /// [`SamlError::MetadataParse`] for unusable metadata.
    pub async fn resolve(&self, fetch_timeout: Duration) -> SamlResult<EntityDescriptor> {
        let descriptor = match self {
            Self::File(path) => parse_idp_metadata(&read_metadata_file(path).await?)?,
            Self::Url(url) => parse_idp_metadata(&fetch_metadata(url, fetch_timeout).await?)?,
            Self::Manual {
                entity_id,
                sso_url,
                certificate,
            } => EntityDescriptor::manual_idp(entity_id.clone(), sso_url.clone(), certificate.clone()),
        };

        tracing::info!(
            source = %self.describe(),
            entity_id = %descriptor.entity_id,
            certificates = descriptor.signing_certificates.len(),
            "loaded IdP descriptor"
        );
        Ok(descriptor)
    }
}

async fn read_metadata_file(path: &Path) -> SamlResult<String> {
    tracing::info!(path = %path.display(), "loading IdP metadata from file");
    match tokio::fs::read_to_string(path).await {
        Ok(xml) => Ok(xml),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigurationError::new(
            ConfigErrorKind::MissingMetadataFile,
            format!("IdP metadata file not found: {}", path.display()),
        )
        .with_remediation(format!(
            "Please download IdP metadata and save it to this location.\n\n\
             For Keycloak, run:\n\n  \
             mkdir -p metadata\n  \
             curl -o {} \\\n    \
             http://localhost:8080/realms/myrealm/protocol/saml/descriptor\n\n\
             Or open the URL in your browser and save the XML content.\n\n\
             Then restart the application.",
            path.display()
        ))
        .into()),
        Err(e) => Err(SamlError::MetadataFetch {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn fetch_metadata(url: &Url, timeout: Duration) -> SamlResult<String> {
    tracing::info!(%url, "fetching IdP metadata");
    let fetch_error = |reason: String| SamlError::MetadataFetch {
        source_name: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_error(e.to_string()))?;

    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "application/xml")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                fetch_error(format!("timed out after {}s", timeout.as_secs()))
            } else {
                fetch_error(e.to_string())
            }
        })?;

    let mut response = response
        .error_for_status()
        .map_err(|e| fetch_error(e.to_string()))?;

    let limit = METADATA_PARSE_LIMITS.max_bytes;
    let too_large = || fetch_error(format!("metadata exceeds {limit} bytes"));
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(too_large());
    }

    // Content-Length may be absent or wrong.
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_error(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body).map_err(|e| fetch_error(format!("metadata is not UTF-8: {e}")))
}
