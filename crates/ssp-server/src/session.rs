//! Local login sessions.
//!
//! A successful login stores the projected [`AuthenticatedSession`] under a
//! random ID that travels in an `HttpOnly` cookie. Sessions live in memory
//! and expire after an hour.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ssp_protocol_saml::AuthenticatedSession;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "ssp_session";

/// Session lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A logged in user.
#[derive(Debug, Clone)]
pub struct StoredSession {
    /// The SAML login.
    pub session: AuthenticatedSession,
    /// The base64 SAMLResponse, kept only in debug mode.
    pub saml_response: Option<String>,
    /// When the login completed.
    pub login_time: DateTime<Utc>,
}

/// In-memory session store.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<DashMap<String, StoredSession>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a session and returns its new ID.
    pub fn create(&self, session: StoredSession) -> String {
        let id = ssp_crypto::generate_session_id();
        self.inner.insert(id.clone(), session);
        id
    }

    /// Returns a live session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<StoredSession> {
        let entry = self.inner.get(id)?;
        if is_expired(&entry) {
            drop(entry);
            self.inner.remove(id);
            return None;
        }
        Some(entry.clone())
    }

    /// Removes a session.
    pub fn remove(&self, id: &str) -> Option<StoredSession> {
        self.inner.remove(id).map(|(_, session)| session)
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, session| !is_expired(session));
        before.saturating_sub(self.inner.len())
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no session is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn is_expired(session: &StoredSession) -> bool {
    Utc::now()
        .signed_duration_since(session.login_time)
        .to_std()
        .unwrap_or(Duration::ZERO)
        > SESSION_TTL
}

/// Periodically removes expired sessions.
pub async fn session_cleanup_task(store: SessionStore) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        let removed = store.cleanup_expired();
        if removed > 0 {
            tracing::info!(removed, "cleaned up expired sessions");
        }
    }
}

/// Builds the `Set-Cookie` value for a new session.
#[must_use]
pub fn create_session_cookie(session_id: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE_NAME}={session_id}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_TTL.as_secs()
    )
}

/// Builds the `Set-Cookie` value that clears the session cookie.
#[must_use]
pub fn clear_session_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE_NAME}=; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age=0")
}

/// Adds a `Set-Cookie` header.
pub fn set_cookie(headers: &mut HeaderMap, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        headers.append(SET_COOKIE, value);
    }
}

/// Reads the session ID from the `Cookie` header.
#[must_use]
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|part| {
            part.trim()
                .strip_prefix(SESSION_COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        })
}
