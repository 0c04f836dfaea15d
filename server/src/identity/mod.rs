//! Identity Context
//!
//! Discord identity of an authenticated user, resolved once per session
//! refresh and handed to the access resolver as plain IDs and flags.

pub mod discord;
pub mod permissions;
pub mod session;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

pub use discord::{DiscordIdentityProvider, IdentityError, IdentityProvider};
pub use permissions::{GlobalPermissions, GlobalRoleConfig};
pub use session::{IdentityService, IdentitySession, SessionCredentials, SessionError, SessionTiming};

/// Raw identity data returned by an [`IdentityProvider`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscordIdentity {
    pub servers: Vec<DiscordServerMembership>,
    pub nickname: Option<String>,
}

/// One Discord server the user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscordServerMembership {
    pub server_id: String,
    pub is_owner: bool,
    pub is_admin: bool,
    /// Role IDs held. Only fetched for tracked servers.
    pub roles: Vec<String>,
}

/// Resolved identity for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    pub user_id: String,
    pub nickname: Option<String>,
    pub server_ids: BTreeSet<String>,
    /// Servers the user owns or administers.
    pub managed_server_ids: BTreeSet<String>,
    pub server_roles: BTreeMap<String, Vec<String>>,
    pub permissions: GlobalPermissions,
}

impl IdentityContext {
    /// Context with no servers, roles or permissions.
    #[must_use]
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Build a context from provider data.
    ///
    /// Global permissions use the roles held on tracked servers and count the
    /// user as a server owner when they manage one of them. With no tracked
    /// servers, managing any server counts.
    #[must_use]
    pub fn from_identity(
        user_id: impl Into<String>,
        identity: &DiscordIdentity,
        global_roles: &GlobalRoleConfig,
        tracked_servers: &[String],
    ) -> Self {
        let is_tracked =
            |id: &str| tracked_servers.is_empty() || tracked_servers.iter().any(|t| t == id);

        let server_ids = identity
            .servers
            .iter()
            .map(|s| s.server_id.clone())
            .collect();
        let managed_server_ids: BTreeSet<String> = identity
            .servers
            .iter()
            .filter(|s| s.is_owner || s.is_admin)
            .map(|s| s.server_id.clone())
            .collect();
        let server_roles: BTreeMap<String, Vec<String>> = identity
            .servers
            .iter()
            .filter(|s| !s.roles.is_empty())
            .map(|s| (s.server_id.clone(), s.roles.clone()))
            .collect();

        let tracked_roles: Vec<String> = server_roles
            .iter()
            .filter(|(id, _)| is_tracked(id))
            .flat_map(|(_, roles)| roles.iter().cloned())
            .collect();
        let manages_tracked = managed_server_ids.iter().any(|id| is_tracked(id));

        Self {
            user_id: user_id.into(),
            nickname: identity.nickname.clone(),
            server_ids,
            managed_server_ids,
            server_roles,
            permissions: GlobalPermissions::compute(global_roles, &tracked_roles, manages_tracked),
        }
    }

    /// Role IDs held on a Discord server.
    #[must_use]
    pub fn roles_on(&self, server_id: &str) -> &[String] {
        self.server_roles
            .get(server_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Whether the user owns or administers a Discord server.
    #[must_use]
    pub fn is_owner_or_admin_of(&self, server_id: &str) -> bool {
        self.managed_server_ids.contains(server_id)
    }

    #[must_use]
    pub const fn has_global_access(&self) -> bool {
        self.permissions.has_global_access()
    }
}
