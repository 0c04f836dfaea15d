//! API Router and Application State
//!
//! Central routing configuration and shared state.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::access::AccessResolver;
use crate::config::Config;
use crate::identity::IdentityService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Guild access resolver
    pub resolver: Arc<AccessResolver>,
    /// Session-scoped identity cache
    pub identity: Arc<IdentityService>,
    /// Server configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(resolver: AccessResolver, identity: IdentityService, config: Config) -> Self {
        Self {
            resolver: Arc::new(resolver),
            identity: Arc::new(identity),
            config: Arc::new(config),
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/guilds/{id}/access", get(handlers::get_guild_access))
        .route(
            "/api/guilds/{id}/permissions",
            get(handlers::get_guild_permissions),
        )
        .route(
            "/api/discord/servers/{server_id}/guilds",
            get(handlers::list_accessible_guilds),
        )
        .route("/api/session/refresh", post(handlers::refresh_session))
        .layer(from_fn_with_state(state.clone(), auth::require_identity));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
