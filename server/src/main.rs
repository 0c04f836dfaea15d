//! Guild Tracker Server - Main Entry Point

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use gt_server::access::{AccessPolicy, AccessResolver, PgGuildStore};
use gt_server::identity::{DiscordIdentityProvider, IdentityService};
use gt_server::{api, config, db};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gt_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        tracked_servers = config.discord_server_ids.len(),
        super_admin = config.has_super_admin(),
        unconfigured_policy = ?config.unconfigured_guild_policy,
        "Starting Guild Tracker Server"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    let store = Arc::new(PgGuildStore::new(db_pool));
    let resolver = AccessResolver::new(store, AccessPolicy::from_config(&config));

    let provider = DiscordIdentityProvider::new(
        config.discord_api_base.clone(),
        config.discord_server_ids.clone(),
    )
    .context("Failed to build Discord HTTP client")?;
    let identity = IdentityService::from_config(Arc::new(provider), &config);

    // Build application state
    let state = api::AppState::new(resolver, identity, config.clone());

    // Periodic cleanup of expired sessions
    let sessions = state.identity.clone();
    let purge_every = Duration::from_secs(config.session_refresh_secs.max(60).unsigned_abs());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            sessions.purge_expired(Utc::now());
        }
    });

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
