//! Guild records consumed by the access resolver.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// In-game guild bound to a Discord server.
///
/// Carries both role schemas. `member_role_id`, `officer_role_id` and
/// `leader_role_id` are the automatic roles created by the bot; the
/// `access_role_ids` / `officer_role_ids` columns hold legacy JSON arrays.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Guild {
    pub id: String,
    pub title: String,
    pub discord_server_id: String,
    pub leader_id: Option<String>,
    pub member_role_id: Option<String>,
    pub officer_role_id: Option<String>,
    pub leader_role_id: Option<String>,
    pub access_role_ids: Option<String>,
    pub officer_role_ids: Option<String>,
    pub default_role_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Guild {
    /// Create a guild with no leader and no role configuration.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        discord_server_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            discord_server_id: discord_server_id.into(),
            leader_id: None,
            member_role_id: None,
            officer_role_id: None,
            leader_role_id: None,
            access_role_ids: None,
            officer_role_ids: None,
            default_role_id: None,
            created_at: Utc::now(),
        }
    }

    /// Leader user ID, ignoring blank values.
    #[must_use]
    pub fn leader(&self) -> Option<&str> {
        non_blank(self.leader_id.as_deref())
    }

    /// Whether `user_id` is the designated leader of this guild.
    #[must_use]
    pub fn is_led_by(&self, user_id: &str) -> bool {
        self.leader().is_some_and(|leader| leader == user_id)
    }
}

/// Sort guilds into their stable listing order: creation time, then ID.
pub fn sort_guilds(guilds: &mut [Guild]) {
    guilds.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
