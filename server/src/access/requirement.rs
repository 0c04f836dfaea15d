//! Role requirement normalization.
//!
//! A guild's role configuration lives in two schemas: the automatic
//! member/officer/leader roles created by the bot, and the legacy access,
//! officer and default role fields. [`RoleSources`] reads both into one view
//! and [`RoleRequirement`] turns that view into an explicit decision input.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::models::{non_blank, Guild};

/// Where a guild role requirement was configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    /// Automatic member role.
    MemberRole,
    /// Automatic officer role.
    OfficerRole,
    /// Automatic leader role.
    LeaderRole,
    /// Legacy generic access role list.
    LegacyAccess,
    /// Legacy officer role list.
    LegacyOfficer,
    /// Legacy single default role.
    LegacyDefault,
}

impl RoleSource {
    pub const ALL: [Self; 6] = [
        Self::MemberRole,
        Self::OfficerRole,
        Self::LeaderRole,
        Self::LegacyAccess,
        Self::LegacyOfficer,
        Self::LegacyDefault,
    ];
}

/// A stored legacy role list that is not a JSON array of strings.
#[derive(Debug, Error)]
#[error("malformed {field} for guild {guild_id}: {source}")]
pub struct MalformedRoleList {
    pub guild_id: String,
    pub field: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Policy for guilds that have no role requirement configured at all.
///
/// Applies to every guild alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconfiguredPolicy {
    /// Only admins, server owners and the leader can reach the guild.
    #[default]
    Deny,
    /// Every authenticated user can reach the guild.
    Open,
}

#[derive(Debug, Error)]
#[error("unknown unconfigured guild policy '{0}', expected 'deny' or 'open'")]
pub struct ParsePolicyError(String);

impl FromStr for UnconfiguredPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" | "closed" => Ok(Self::Deny),
            "open" => Ok(Self::Open),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// Every role ID a guild accepts, grouped by where it was configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSources {
    member_role: Option<String>,
    officer_role: Option<String>,
    leader_role: Option<String>,
    legacy_access: BTreeSet<String>,
    legacy_officer: BTreeSet<String>,
    legacy_default: Option<String>,
    configured: bool,
}

impl RoleSources {
    /// Read both role schemas from a guild record.
    ///
    /// A malformed legacy list is logged and contributes no roles, but still
    /// marks the guild as configured so it can never fall back to open access.
    pub fn from_guild(guild: &Guild) -> Self {
        let member_role = single_role(guild.member_role_id.as_deref());
        let officer_role = single_role(guild.officer_role_id.as_deref());
        let leader_role = single_role(guild.leader_role_id.as_deref());
        let legacy_default = single_role(guild.default_role_id.as_deref());

        let (legacy_access, access_configured) =
            legacy_list(guild, "access_role_ids", guild.access_role_ids.as_deref());
        let (legacy_officer, officer_configured) =
            legacy_list(guild, "officer_role_ids", guild.officer_role_ids.as_deref());

        let configured = member_role.is_some()
            || officer_role.is_some()
            || leader_role.is_some()
            || legacy_default.is_some()
            || access_configured
            || officer_configured;

        Self {
            member_role,
            officer_role,
            leader_role,
            legacy_access,
            legacy_officer,
            legacy_default,
            configured,
        }
    }

    /// Whether any role field is set, including malformed ones.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.configured
    }

    /// Whether the user holds a role accepted through `source`.
    #[must_use]
    pub fn source_matches(&self, source: RoleSource, roles: &[String]) -> bool {
        match source {
            RoleSource::MemberRole => holds(self.member_role.as_deref(), roles),
            RoleSource::OfficerRole => holds(self.officer_role.as_deref(), roles),
            RoleSource::LeaderRole => holds(self.leader_role.as_deref(), roles),
            RoleSource::LegacyAccess => holds_any(&self.legacy_access, roles),
            RoleSource::LegacyOfficer => holds_any(&self.legacy_officer, roles),
            RoleSource::LegacyDefault => holds(self.legacy_default.as_deref(), roles),
        }
    }

    /// Union of every configured role ID across both schemas.
    #[must_use]
    pub fn required_roles(&self) -> BTreeSet<String> {
        let singles = [
            &self.member_role,
            &self.officer_role,
            &self.leader_role,
            &self.legacy_default,
        ];

        singles
            .into_iter()
            .flatten()
            .chain(&self.legacy_access)
            .chain(&self.legacy_officer)
            .cloned()
            .collect()
    }
}

/// Effective requirement a non-admin user must satisfy to reach a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Nothing configured and the open policy is active.
    Open,
    /// Any one of these roles grants access. Empty when only malformed lists were stored.
    RoleSet(BTreeSet<String>),
    /// Nothing configured and the deny policy is active.
    Unconfigured,
}

impl RoleRequirement {
    #[must_use]
    pub fn for_guild(guild: &Guild, policy: UnconfiguredPolicy) -> Self {
        Self::from_sources(&RoleSources::from_guild(guild), policy)
    }

    #[must_use]
    pub fn from_sources(sources: &RoleSources, policy: UnconfiguredPolicy) -> Self {
        if sources.is_configured() {
            return Self::RoleSet(sources.required_roles());
        }

        match policy {
            UnconfiguredPolicy::Open => Self::Open,
            UnconfiguredPolicy::Deny => Self::Unconfigured,
        }
    }

    /// Whether the user's roles satisfy this requirement.
    #[must_use]
    pub fn is_satisfied_by(&self, roles: &[String]) -> bool {
        match self {
            Self::Open => true,
            Self::Unconfigured => false,
            Self::RoleSet(required) => roles.iter().any(|role| required.contains(role)),
        }
    }
}

fn single_role(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_owned)
}

fn holds(role: Option<&str>, roles: &[String]) -> bool {
    role.is_some_and(|required| roles.iter().any(|r| r == required))
}

fn holds_any(required: &BTreeSet<String>, roles: &[String]) -> bool {
    roles.iter().any(|role| required.contains(role))
}

/// Parse a legacy JSON role list.
///
/// `Ok(None)` for absent, blank, `null` or empty lists.
pub fn parse_role_list(raw: Option<&str>) -> Result<Option<BTreeSet<String>>, serde_json::Error> {
    let Some(raw) = non_blank(raw) else {
        return Ok(None);
    };

    let parsed: Option<Vec<String>> = serde_json::from_str(raw)?;
    let roles: BTreeSet<String> = parsed
        .unwrap_or_default()
        .into_iter()
        .filter_map(|role| single_role(Some(role.as_str())))
        .collect();

    Ok((!roles.is_empty()).then_some(roles))
}

/// Returns the parsed roles and whether the field counts as configured.
fn legacy_list(guild: &Guild, field: &'static str, raw: Option<&str>) -> (BTreeSet<String>, bool) {
    match parse_role_list(raw) {
        Ok(Some(roles)) => (roles, true),
        Ok(None) => (BTreeSet::new(), false),
        Err(source) => {
            let error = MalformedRoleList {
                guild_id: guild.id.clone(),
                field,
                source,
            };
            warn!(guild_id = %guild.id, %error, "Ignoring malformed role list");
            (BTreeSet::new(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    fn guild() -> Guild {
        Guild::new("g1", "Guild One", "s1")
    }

    #[test]
    fn test_parse_role_list_variants() {
        assert_eq!(parse_role_list(None).unwrap(), None);
        assert_eq!(parse_role_list(Some("  ")).unwrap(), None);
        assert_eq!(parse_role_list(Some("null")).unwrap(), None);
        assert_eq!(parse_role_list(Some("[]")).unwrap(), None);
        assert_eq!(parse_role_list(Some(r#"["", " "]"#)).unwrap(), None);

        let parsed = parse_role_list(Some(r#"["R1", "R2", "R1"]"#))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("R1"));
        assert!(parsed.contains("R2"));

        assert!(parse_role_list(Some("{not json")).is_err());
        assert!(parse_role_list(Some("[1, 2]")).is_err());
    }

    #[test]
    fn test_no_fields_is_unconfigured() {
        let sources = RoleSources::from_guild(&guild());
        assert!(!sources.is_configured());
        assert!(sources.required_roles().is_empty());

        assert_eq!(
            RoleRequirement::from_sources(&sources, UnconfiguredPolicy::Deny),
            RoleRequirement::Unconfigured
        );
        assert_eq!(
            RoleRequirement::from_sources(&sources, UnconfiguredPolicy::Open),
            RoleRequirement::Open
        );
    }

    #[test]
    fn test_blank_single_roles_are_unset() {
        let mut g = guild();
        g.member_role_id = Some(String::new());
        g.default_role_id = Some("  ".to_string());

        assert!(!RoleSources::from_guild(&g).is_configured());
    }

    #[test]
    fn test_required_roles_union_both_schemas() {
        let mut g = guild();
        g.member_role_id = Some("M".to_string());
        g.officer_role_id = Some("O".to_string());
        g.leader_role_id = Some("L".to_string());
        g.access_role_ids = Some(r#"["A1","A2"]"#.to_string());
        g.officer_role_ids = Some(r#"["O2"]"#.to_string());
        g.default_role_id = Some("D".to_string());

        let required = RoleSources::from_guild(&g).required_roles();
        let expected: BTreeSet<String> = ["M", "O", "L", "A1", "A2", "O2", "D"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(required, expected);
    }

    #[test]
    fn test_malformed_list_is_configured_but_empty() {
        let mut g = guild();
        g.access_role_ids = Some("[\"R1\"".to_string());

        let sources = RoleSources::from_guild(&g);
        assert!(sources.is_configured());
        assert!(sources.required_roles().is_empty());

        // Even under the open policy a malformed list never opens the guild.
        let requirement = RoleRequirement::from_sources(&sources, UnconfiguredPolicy::Open);
        assert_eq!(requirement, RoleRequirement::RoleSet(BTreeSet::new()));
        assert!(!requirement.is_satisfied_by(&roles(&["R1"])));
    }

    #[test]
    fn test_malformed_list_does_not_hide_other_fields() {
        let mut g = guild();
        g.access_role_ids = Some("garbage".to_string());
        g.officer_role_ids = Some(r#"["O1"]"#.to_string());

        let sources = RoleSources::from_guild(&g);
        assert!(sources.source_matches(RoleSource::LegacyOfficer, &roles(&["O1"])));
        assert!(!sources.source_matches(RoleSource::LegacyAccess, &roles(&["O1"])));
    }

    #[test]
    fn test_each_source_matches_its_own_field() {
        let mut g = guild();
        g.member_role_id = Some("R9".to_string());
        g.access_role_ids = Some(r#"["R9","R3"]"#.to_string());
        g.default_role_id = Some("R3".to_string());

        let sources = RoleSources::from_guild(&g);
        let held = roles(&["R9"]);
        let matched: Vec<RoleSource> = RoleSource::ALL
            .into_iter()
            .filter(|source| sources.source_matches(*source, &held))
            .collect();
        assert_eq!(matched, [RoleSource::MemberRole, RoleSource::LegacyAccess]);
        assert!(RoleSource::ALL
            .into_iter()
            .all(|source| !sources.source_matches(source, &[])));
    }

    #[test]
    fn test_requirement_satisfaction() {
        let required: BTreeSet<String> = ["R1".to_string()].into_iter().collect();
        let requirement = RoleRequirement::RoleSet(required);

        assert!(requirement.is_satisfied_by(&roles(&["R0", "R1"])));
        assert!(!requirement.is_satisfied_by(&roles(&["R0"])));
        assert!(!requirement.is_satisfied_by(&[]));
        assert!(RoleRequirement::Open.is_satisfied_by(&[]));
        assert!(!RoleRequirement::Unconfigured.is_satisfied_by(&roles(&["R1"])));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("deny".parse::<UnconfiguredPolicy>().unwrap(), UnconfiguredPolicy::Deny);
        assert_eq!(" Open ".parse::<UnconfiguredPolicy>().unwrap(), UnconfiguredPolicy::Open);
        assert_eq!("closed".parse::<UnconfiguredPolicy>().unwrap(), UnconfiguredPolicy::Deny);
        assert!("maybe".parse::<UnconfiguredPolicy>().is_err());
        assert_eq!(UnconfiguredPolicy::default(), UnconfiguredPolicy::Deny);
    }
}
