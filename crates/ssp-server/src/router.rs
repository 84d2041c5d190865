//! Router configuration.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/metadata", get(handlers::metadata))
        .route("/login", get(handlers::login))
        .route("/acs", post(handlers::acs))
        .route("/profile", get(handlers::profile))
        .route("/debug", get(handlers::debug))
        .route("/logout", get(handlers::logout))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
