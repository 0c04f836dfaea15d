//! Global permissions derived from configured Discord role IDs.

use serde::Serialize;

/// Discord role IDs that carry application-wide permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalRoleConfig {
    pub resource_access: Vec<String>,
    pub resource_admin: Vec<String>,
    pub target_edit: Vec<String>,
    pub report_access: Vec<String>,
    pub user_management: Vec<String>,
    pub data_export: Vec<String>,
}

/// Application-wide permission flags for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalPermissions {
    pub has_resource_access: bool,
    pub has_resource_admin_access: bool,
    pub has_target_edit_access: bool,
    pub has_report_access: bool,
    pub has_user_management_access: bool,
    pub has_data_export_access: bool,
}

impl GlobalPermissions {
    /// Compute flags from held roles.
    ///
    /// Server owners and resource admins get resource access, resource admin
    /// and target edit. Report, user management and data export are granted
    /// by role only.
    #[must_use]
    pub fn compute(config: &GlobalRoleConfig, roles: &[String], is_server_owner: bool) -> Self {
        let is_admin = is_server_owner || has_any_role(roles, &config.resource_admin);

        Self {
            has_resource_access: is_admin || has_any_role(roles, &config.resource_access),
            has_resource_admin_access: is_admin,
            has_target_edit_access: is_admin || has_any_role(roles, &config.target_edit),
            has_report_access: has_any_role(roles, &config.report_access),
            has_user_management_access: has_any_role(roles, &config.user_management),
            has_data_export_access: has_any_role(roles, &config.data_export),
        }
    }

    /// Admin or target edit access, which opens every guild.
    #[must_use]
    pub const fn has_global_access(&self) -> bool {
        self.has_resource_admin_access || self.has_target_edit_access
    }
}

/// Whether the user holds any of the required roles.
#[must_use]
pub fn has_any_role(roles: &[String], required: &[String]) -> bool {
    required.iter().any(|role| roles.contains(role))
}
