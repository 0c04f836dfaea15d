//! Guild Access Handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::error::ApiResult;
use super::AppState;
use crate::access::{AccessTier, GuildPermissionsReport};
use crate::identity::{GlobalPermissions, IdentityContext, SessionCredentials};

#[derive(Debug, Serialize)]
pub struct GuildAccessResponse {
    pub guild_id: String,
    pub can_access: bool,
    /// Tier that granted access, absent when denied.
    pub tier: Option<AccessTier>,
}

#[derive(Debug, Serialize)]
pub struct AccessibleGuildsResponse {
    pub discord_server_id: String,
    pub guild_ids: Vec<String>,
}

/// Session summary returned after a forced refresh.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub user_id: String,
    pub nickname: Option<String>,
    pub server_ids: Vec<String>,
    pub managed_server_ids: Vec<String>,
    pub permissions: GlobalPermissions,
    pub is_super_admin: bool,
    pub refreshed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Whether the caller bypasses guild role checks entirely.
fn has_global_access(state: &AppState, identity: &IdentityContext) -> bool {
    identity.has_global_access() || state.resolver.policy().is_super_admin(&identity.user_id)
}

/// Check single-guild access.
///
/// GET /api/guilds/:id/access
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get_guild_access(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(guild_id): Path<String>,
) -> ApiResult<Json<GuildAccessResponse>> {
    let decision = state
        .resolver
        .decide_guild_access(&guild_id, &identity)
        .await?;

    Ok(Json(GuildAccessResponse {
        guild_id,
        can_access: decision.is_granted(),
        tier: decision.tier(),
    }))
}

/// Permission report for one guild.
///
/// GET /api/guilds/:id/permissions
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get_guild_permissions(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(guild_id): Path<String>,
) -> ApiResult<Json<GuildPermissionsReport>> {
    let report = state.resolver.guild_permissions(&guild_id, &identity).await?;
    Ok(Json(report))
}

/// Guilds on a Discord server the caller can reach.
///
/// GET /api/discord/servers/:server_id/guilds
#[tracing::instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn list_accessible_guilds(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(server_id): Path<String>,
) -> Json<AccessibleGuildsResponse> {
    let guild_ids = state
        .resolver
        .get_accessible_guilds(
            &server_id,
            identity.roles_on(&server_id),
            &identity.user_id,
            identity.is_owner_or_admin_of(&server_id),
            has_global_access(&state, &identity),
        )
        .await;

    Json(AccessibleGuildsResponse {
        discord_server_id: server_id,
        guild_ids,
    })
}

/// Force an identity refresh for the current session.
///
/// POST /api/session/refresh
pub async fn refresh_session(
    State(state): State<AppState>,
    Extension(credentials): Extension<SessionCredentials>,
) -> ApiResult<Json<SessionSummary>> {
    let session = state.identity.refresh(&credentials, Utc::now()).await?;
    let context = session.context();

    info!(user_id = %context.user_id, "Session refreshed on request");

    Ok(Json(SessionSummary {
        user_id: context.user_id.clone(),
        nickname: context.nickname.clone(),
        server_ids: context.server_ids.iter().cloned().collect(),
        managed_server_ids: context.managed_server_ids.iter().cloned().collect(),
        permissions: context.permissions,
        is_super_admin: state.resolver.policy().is_super_admin(&context.user_id),
        refreshed_at: session.refreshed_at(),
        expires_at: session.expires_at(),
    }))
}
