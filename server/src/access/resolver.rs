//! Guild access resolution.
//!
//! Decides which in-game guilds a user can reach from their Discord identity.
//!
//! Precedence, highest first:
//! 1. Super admin
//! 2. Discord server owner or administrator
//! 3. Global resource access
//! 4. Guild role match (automatic and legacy fields, unordered union)
//! 5. Leader by user ID
//! 6. Open access for unconfigured guilds, when the open policy is active
//!
//! Every failure resolves to denial.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::membership::{GuildMembership, GuildPermissionsReport};
use super::models::{non_blank, sort_guilds, Guild};
use super::requirement::{RoleRequirement, RoleSources, UnconfiguredPolicy};
use super::store::{GuildStore, StoreError};
use crate::config::Config;
use crate::identity::IdentityContext;

/// Resolver errors.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Referenced guild does not exist.
    #[error("Guild not found: {0}")]
    NotFound(String),

    /// Guild store could not be read.
    #[error("Guild store unavailable")]
    StoreUnavailable(#[from] StoreError),
}

/// Resolver configuration, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Discord user ID that bypasses every check.
    pub super_admin_id: Option<String>,
    /// Outcome for guilds with no role requirement.
    pub unconfigured: UnconfiguredPolicy,
}

impl AccessPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            super_admin_id: config.super_admin_user_id.clone(),
            unconfigured: config.unconfigured_guild_policy,
        }
    }

    /// Whether `user_id` is the configured super admin. Never true when unset.
    #[must_use]
    pub fn is_super_admin(&self, user_id: &str) -> bool {
        match (non_blank(self.super_admin_id.as_deref()), non_blank(Some(user_id))) {
            (Some(admin), Some(user)) => admin == user,
            _ => false,
        }
    }
}

/// Tier that granted access. Variants are declared highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    SuperAdmin,
    ServerOwnerOrAdmin,
    GlobalAccess,
    GuildRole,
    Leader,
    Open,
}

/// Outcome of evaluating one guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(AccessTier),
    Denied,
}

impl AccessDecision {
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    #[must_use]
    pub const fn tier(&self) -> Option<AccessTier> {
        match self {
            Self::Granted(tier) => Some(*tier),
            Self::Denied => None,
        }
    }
}

/// Caller-resolved identity facts for one Discord server.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub user_id: Option<&'a str>,
    pub roles_on_server: &'a [String],
    pub is_server_owner_or_admin: bool,
    pub has_global_access: bool,
}

impl<'a> AccessRequest<'a> {
    /// Request carrying roles and the global flag only.
    #[must_use]
    pub const fn roles_only(roles_on_server: &'a [String], has_global_access: bool) -> Self {
        Self {
            user_id: None,
            roles_on_server,
            is_server_owner_or_admin: false,
            has_global_access,
        }
    }
}

/// Evaluate a single guild against a request.
///
/// Pure: reads nothing beyond its arguments. The first tier that matches wins.
#[must_use]
pub fn evaluate_guild(
    policy: &AccessPolicy,
    guild: &Guild,
    request: &AccessRequest<'_>,
) -> AccessDecision {
    if request.user_id.is_some_and(|u| policy.is_super_admin(u)) {
        return AccessDecision::Granted(AccessTier::SuperAdmin);
    }

    if request.is_server_owner_or_admin {
        return AccessDecision::Granted(AccessTier::ServerOwnerOrAdmin);
    }

    if request.has_global_access {
        return AccessDecision::Granted(AccessTier::GlobalAccess);
    }

    let requirement = RoleRequirement::for_guild(guild, policy.unconfigured);
    if matches!(requirement, RoleRequirement::RoleSet(_))
        && requirement.is_satisfied_by(request.roles_on_server)
    {
        return AccessDecision::Granted(AccessTier::GuildRole);
    }

    if request.user_id.is_some_and(|u| guild.is_led_by(u)) {
        return AccessDecision::Granted(AccessTier::Leader);
    }

    match requirement {
        RoleRequirement::Open => AccessDecision::Granted(AccessTier::Open),
        RoleRequirement::RoleSet(_) | RoleRequirement::Unconfigured => AccessDecision::Denied,
    }
}

/// Guild access resolver.
///
/// Holds no per-user state and caches nothing, so one instance serves every
/// request concurrently.
#[derive(Clone)]
pub struct AccessResolver {
    store: Arc<dyn GuildStore>,
    policy: AccessPolicy,
}

impl std::fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessResolver")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AccessResolver {
    #[must_use]
    pub fn new(store: Arc<dyn GuildStore>, policy: AccessPolicy) -> Self {
        Self { store, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Check whether a user can reach one guild.
    ///
    /// Returns `Err(AccessError::NotFound)` for unknown guilds. A store failure
    /// resolves to `Ok(false)`.
    #[tracing::instrument(skip(self, roles_on_server))]
    pub async fn can_access_guild(
        &self,
        guild_id: &str,
        roles_on_server: &[String],
        has_global_access: bool,
    ) -> Result<bool, AccessError> {
        if has_global_access {
            return Ok(true);
        }

        let guild = match self.load_guild(guild_id).await {
            Ok(guild) => guild,
            Err(AccessError::StoreUnavailable(e)) => {
                error!(error = %e, "Guild store unavailable, denying access");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let decision = evaluate_guild(
            &self.policy,
            &guild,
            &AccessRequest::roles_only(roles_on_server, false),
        );

        if !decision.is_granted() {
            debug!(
                guild = %guild.title,
                required = ?RoleSources::from_guild(&guild).required_roles(),
                held = ?roles_on_server,
                "User lacks guild roles"
            );
        }

        Ok(decision.is_granted())
    }

    /// List the IDs of every guild on a Discord server the user can reach.
    ///
    /// Ordered by guild creation time, then ID. A store failure yields an
    /// empty list.
    #[tracing::instrument(skip(self, roles_on_server))]
    pub async fn get_accessible_guilds(
        &self,
        discord_server_id: &str,
        roles_on_server: &[String],
        user_id: &str,
        is_server_owner_or_admin: bool,
        has_global_access: bool,
    ) -> Vec<String> {
        let mut guilds = match self
            .store
            .find_guilds_by_discord_server(discord_server_id)
            .await
        {
            Ok(guilds) => guilds,
            Err(e) => {
                error!(error = %e, "Guild store unavailable, returning no guilds");
                return Vec::new();
            }
        };
        sort_guilds(&mut guilds);

        let request = AccessRequest {
            user_id: Some(user_id),
            roles_on_server,
            is_server_owner_or_admin,
            has_global_access,
        };

        let accessible: Vec<String> = guilds
            .iter()
            .filter_map(|guild| match evaluate_guild(&self.policy, guild, &request) {
                AccessDecision::Granted(tier) => {
                    debug!(guild = %guild.title, ?tier, "Guild accessible");
                    Some(guild.id.clone())
                }
                AccessDecision::Denied => {
                    debug!(guild = %guild.title, "Guild not accessible");
                    None
                }
            })
            .collect();

        debug!(
            accessible = accessible.len(),
            total = guilds.len(),
            "Resolved accessible guilds"
        );

        accessible
    }

    /// Decide access to one guild from a full identity.
    ///
    /// Applies every precedence tier with the roles and ownership held on the
    /// guild's own Discord server. Returns `Err(AccessError::NotFound)` for
    /// unknown guilds. A store failure resolves to [`AccessDecision::Denied`].
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn decide_guild_access(
        &self,
        guild_id: &str,
        identity: &IdentityContext,
    ) -> Result<AccessDecision, AccessError> {
        let guild = match self.load_guild(guild_id).await {
            Ok(guild) => guild,
            Err(AccessError::StoreUnavailable(e)) => {
                error!(error = %e, "Guild store unavailable, denying access");
                return Ok(AccessDecision::Denied);
            }
            Err(e) => return Err(e),
        };

        let server_id = &guild.discord_server_id;
        let request = AccessRequest {
            user_id: Some(&identity.user_id),
            roles_on_server: identity.roles_on(server_id),
            is_server_owner_or_admin: identity.is_owner_or_admin_of(server_id),
            has_global_access: identity.has_global_access(),
        };

        let decision = evaluate_guild(&self.policy, &guild, &request);
        debug!(guild = %guild.title, ?decision, "Evaluated guild access");
        Ok(decision)
    }

    /// Leader, officer and member standing in one guild.
    ///
    /// A store failure yields an all-false membership.
    #[tracing::instrument(skip(self, roles_on_server))]
    pub async fn guild_membership(
        &self,
        guild_id: &str,
        roles_on_server: &[String],
        user_id: &str,
    ) -> Result<GuildMembership, AccessError> {
        match self.load_guild(guild_id).await {
            Ok(guild) => Ok(GuildMembership::resolve(
                &guild,
                roles_on_server,
                Some(user_id),
            )),
            Err(AccessError::StoreUnavailable(e)) => {
                error!(error = %e, "Guild store unavailable, reporting no membership");
                Ok(GuildMembership::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Full permission report for one guild.
    ///
    /// The super admin gets every flag without a store read. A store failure
    /// yields [`GuildPermissionsReport::denied`].
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn guild_permissions(
        &self,
        guild_id: &str,
        identity: &IdentityContext,
    ) -> Result<GuildPermissionsReport, AccessError> {
        if self.policy.is_super_admin(&identity.user_id) {
            return Ok(GuildPermissionsReport::super_admin());
        }

        let guild = match self.load_guild(guild_id).await {
            Ok(guild) => guild,
            Err(AccessError::StoreUnavailable(e)) => {
                error!(error = %e, "Guild store unavailable, reporting no permissions");
                return Ok(GuildPermissionsReport::denied());
            }
            Err(e) => return Err(e),
        };

        let roles = identity.roles_on(&guild.discord_server_id);
        let membership = GuildMembership::resolve(&guild, roles, Some(&identity.user_id));
        let is_server_owner = identity.is_owner_or_admin_of(&guild.discord_server_id);

        let report = GuildPermissionsReport::compose(
            membership,
            is_server_owner,
            identity.permissions.has_resource_admin_access,
            identity.permissions.has_target_edit_access,
        );

        debug!(guild = %guild.title, ?report, "Computed guild permissions");
        Ok(report)
    }

    async fn load_guild(&self, guild_id: &str) -> Result<Guild, AccessError> {
        match self.store.find_guild_by_id(guild_id).await? {
            Some(guild) => Ok(guild),
            None => {
                warn!(guild_id, "Guild not found");
                Err(AccessError::NotFound(guild_id.to_string()))
            }
        }
    }
}
