//! Rendering of per-request failures.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use ssp_protocol_saml::{SamlError, SamlFailure};

use crate::templates::ErrorTemplate;

/// A failed request, rendered as an HTML error page.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    title: &'static str,
    failure: SamlFailure,
}

impl AppError {
    /// Wraps a SAML error. `detail` is only kept when `debug` is set.
    #[must_use]
    pub fn saml(err: &SamlError, detail: Option<&str>, debug: bool) -> Self {
        Self {
            status: StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            title: "SAML Authentication Error",
            failure: err.to_failure(detail, debug),
        }
    }

    /// Returns the HTTP status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the structured failure.
    #[must_use]
    pub fn failure(&self) -> &SamlFailure {
        &self.failure
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(
            kind = %self.failure.kind,
            status = self.status.as_u16(),
            error = %self.failure.message,
            "request failed"
        );

        let page = ErrorTemplate {
            title: self.title,
            kind: self.failure.kind.as_str(),
            message: &self.failure.message,
            remediation: self.failure.remediation.as_deref(),
            detail: self.failure.detail.as_deref(),
        };
        match page.render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to render error page");
                (self.status, self.failure.message).into_response()
            }
        }
    }
}
