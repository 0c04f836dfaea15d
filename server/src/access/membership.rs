//! Guild membership and per-guild permission reports.

use serde::Serialize;

use super::models::Guild;
use super::requirement::{RoleSource, RoleSources};

/// How a user relates to a guild through leadership and roles.
///
/// The flags are independent: an officer who also holds the member role has
/// both `is_officer` and `is_member` set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuildMembership {
    pub is_leader: bool,
    pub is_officer: bool,
    pub is_member: bool,
}

impl GuildMembership {
    /// Derive membership from a guild record.
    ///
    /// `user_id` is optional so callers holding roles only can still ask.
    #[must_use]
    pub fn resolve(guild: &Guild, roles: &[String], user_id: Option<&str>) -> Self {
        let sources = RoleSources::from_guild(guild);
        Self::from_sources(guild, &sources, roles, user_id)
    }

    #[must_use]
    pub fn from_sources(
        guild: &Guild,
        sources: &RoleSources,
        roles: &[String],
        user_id: Option<&str>,
    ) -> Self {
        let has = |source| sources.source_matches(source, roles);

        Self {
            is_leader: has(RoleSource::LeaderRole) || user_id.is_some_and(|u| guild.is_led_by(u)),
            is_officer: has(RoleSource::OfficerRole) || has(RoleSource::LegacyOfficer),
            is_member: has(RoleSource::MemberRole)
                || has(RoleSource::LegacyAccess)
                || has(RoleSource::LegacyDefault),
        }
    }

    /// Collapse to the binary check.
    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.is_leader || self.is_officer || self.is_member
    }
}

/// A user's effective permissions for one guild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuildPermissionsReport {
    pub can_manage_resources: bool,
    pub can_edit_targets: bool,
    pub is_leader: bool,
    pub is_officer: bool,
    pub is_member: bool,
    pub has_global_admin: bool,
    pub is_server_owner: bool,
    pub is_super_admin: bool,
}

impl GuildPermissionsReport {
    /// Every flag set.
    #[must_use]
    pub const fn super_admin() -> Self {
        Self {
            can_manage_resources: true,
            can_edit_targets: true,
            is_leader: true,
            is_officer: true,
            is_member: true,
            has_global_admin: true,
            is_server_owner: false,
            is_super_admin: true,
        }
    }

    /// No flag set.
    #[must_use]
    pub const fn denied() -> Self {
        Self {
            can_manage_resources: false,
            can_edit_targets: false,
            is_leader: false,
            is_officer: false,
            is_member: false,
            has_global_admin: false,
            is_server_owner: false,
            is_super_admin: false,
        }
    }

    /// Combine membership with the user's admin standing.
    ///
    /// Resource management needs global admin, leadership or an officer role.
    /// Target editing needs global admin or the target edit permission.
    #[must_use]
    pub const fn compose(
        membership: GuildMembership,
        is_server_owner: bool,
        has_resource_admin_access: bool,
        has_target_edit_access: bool,
    ) -> Self {
        let has_global_admin = has_resource_admin_access || is_server_owner;

        Self {
            can_manage_resources: has_global_admin
                || membership.is_leader
                || membership.is_officer,
            can_edit_targets: has_global_admin || has_target_edit_access,
            is_leader: membership.is_leader,
            is_officer: membership.is_officer,
            is_member: membership.is_member,
            has_global_admin,
            is_server_owner,
            is_super_admin: false,
        }
    }
}
