//! HTTP handlers.

use askama::Template;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use ssp_protocol_saml::bindings::{HttpPostBinding, SamlMessageType};
use ssp_protocol_saml::xml::pretty_print;
use ssp_protocol_saml::{build_authn_request, EncodedRequest, SamlBinding, SamlError};

use crate::error::AppError;
use crate::session::{
    clear_session_cookie, create_session_cookie, extract_session_cookie, set_cookie,
    StoredSession,
};
use crate::state::AppState;
use crate::templates::{AttributeRow, DebugTemplate, IndexTemplate, ProfileTemplate};

/// Form posted by the IdP to the ACS.
#[derive(Debug, Deserialize)]
pub struct AcsForm {
    /// Base64 encoded Response.
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    /// Opaque value echoed back by the IdP.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Current time, RFC 3339.
    pub timestamp: String,
}

fn render(template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render template");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn current_session(state: &AppState, headers: &HeaderMap) -> Option<(String, StoredSession)> {
    let id = extract_session_cookie(headers)?;
    let session = state.sessions.get(&id)?;
    Some((id, session))
}

fn login_time(session: &StoredSession) -> String {
    session.login_time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `GET /`
pub async fn home(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let current = current_session(&state, &headers);
    let metadata_url = state.config.metadata_url();
    let page = IndexTemplate {
        authenticated: current.is_some(),
        name_id: current.as_ref().map(|(_, s)| s.session.name_id()),
        sp_entity_id: &state.sp.entity_id,
        acs_url: &state.sp.acs_url,
        metadata_url: &metadata_url,
        idp_entity_id: &state.idp.entity_id,
        idp_sso_url: state.idp.sso_location(SamlBinding::HttpRedirect).unwrap_or("-"),
        debug: state.debug_enabled(),
    };
    render(&page)
}

/// `GET /metadata`
pub async fn metadata(State(state): State<AppState>) -> Response {
    (
        [(CONTENT_TYPE, "application/xml")],
        state.sp_metadata.to_string(),
    )
        .into_response()
}

/// `GET /login`
///
/// Sends the browser to the IdP with a signed Redirect binding AuthnRequest.
///
/// # Errors
///
/// Fails when the IdP has no Redirect SSO endpoint or signing fails.
pub async fn login(State(state): State<AppState>) -> Result<Response, AppError> {
    let debug = state.debug_enabled();
    let (request, encoded) = build_authn_request(
        &state.sp,
        &state.credentials,
        &state.idp,
        SamlBinding::HttpRedirect,
        None,
    )
    .map_err(|e| AppError::saml(&e, None, debug))?;

    if let Some(pending) = &state.pending {
        pending.record(&request.id);
    }
    tracing::info!(request_id = %request.id, idp = %state.idp.entity_id, "sending AuthnRequest");

    match encoded {
        EncodedRequest::Redirect { url } => {
            if state.log_saml_messages() {
                tracing::info!(%url, "AuthnRequest redirect");
            }
            Ok((StatusCode::FOUND, [(LOCATION, url)]).into_response())
        }
        EncodedRequest::Post { form_html, .. } => Ok(Html(form_html).into_response()),
    }
}

/// `POST /acs`
///
/// Validates the posted Response and starts a local session.
///
/// # Errors
///
/// Any validation failure is rendered as an error page and no session is
/// created.
pub async fn acs(
    State(state): State<AppState>,
    Form(form): Form<AcsForm>,
) -> Result<Response, AppError> {
    let debug = state.debug_enabled();
    let encoded = form.saml_response.unwrap_or_default();

    let decoded = (debug || state.log_saml_messages())
        .then(|| HttpPostBinding::decode(&encoded, SamlMessageType::Response, None).ok())
        .flatten()
        .map(|message| pretty_print(&message.xml));
    if state.log_saml_messages() {
        if let Some(xml) = &decoded {
            tracing::info!(saml_response = %xml, "received SAML response");
        }
    }

    let identity = state
        .validator
        .validate(&encoded)
        .map_err(|e| AppError::saml(&e, decoded.as_deref(), debug))?;

    let session = ssp_protocol_saml::session::project(&identity);
    tracing::info!(
        name_id = %session.name_id(),
        issuer = %session.issuer(),
        relay_state = ?form.relay_state,
        "login succeeded"
    );

    let session_id = state.sessions.create(StoredSession {
        session,
        saml_response: debug.then_some(encoded),
        login_time: Utc::now(),
    });

    let mut response = Redirect::to("/profile").into_response();
    set_cookie(
        response.headers_mut(),
        &create_session_cookie(&session_id, state.secure_cookies()),
    );
    Ok(response)
}

/// `GET /profile`
pub async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some((_, stored)) = current_session(&state, &headers) else {
        return Redirect::to("/").into_response();
    };

    let session = &stored.session;
    let page = ProfileTemplate {
        name_id: session.name_id(),
        name_id_format: session.name_id_format(),
        session_index: session.session_index(),
        issuer: session.issuer(),
        login_time: login_time(&stored),
        attributes: session
            .attributes()
            .iter()
            .map(|(name, values)| AttributeRow {
                name: name.clone(),
                values: values.clone(),
            })
            .collect(),
        debug: state.debug_enabled(),
    };
    render(&page)
}

/// `GET /debug`
///
/// Only routed to a page when debug mode is on.
///
/// # Errors
///
/// Fails if the stored response no longer decodes.
pub async fn debug(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if !state.debug_enabled() {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let Some((_, stored)) = current_session(&state, &headers) else {
        return Ok(Redirect::to("/").into_response());
    };
    let Some(raw) = stored.saml_response.as_deref() else {
        return Ok(Redirect::to("/profile").into_response());
    };

    let message = HttpPostBinding::decode(raw, SamlMessageType::Response, None)
        .map_err(|e: SamlError| AppError::saml(&e, None, true))?;
    let page = DebugTemplate {
        name_id: stored.session.name_id(),
        login_time: login_time(&stored),
        raw_response: raw,
        decoded_response: pretty_print(&message.xml),
    };
    Ok(render(&page))
}

/// `GET /logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = extract_session_cookie(&headers) {
        if let Some(stored) = state.sessions.remove(&id) {
            tracing::info!(name_id = %stored.session.name_id(), "logged out");
        }
    }

    let mut response = Redirect::to("/").into_response();
    set_cookie(
        response.headers_mut(),
        &clear_session_cookie(state.secure_cookies()),
    );
    response
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
