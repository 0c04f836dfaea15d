//! Discord REST identity provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::{DiscordIdentity, DiscordServerMembership};

/// Discord `ADMINISTRATOR` permission bit.
const ADMINISTRATOR: u64 = 1 << 3;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Discord request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discord returned status {0}")]
    Status(u16),
}

/// Source of Discord identity data for a user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_identity(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<DiscordIdentity, IdentityError>;
}

/// Entry of `GET /users/@me/guilds`.
#[derive(Debug, Deserialize)]
struct PartialServer {
    id: String,
    #[serde(default)]
    owner: bool,
    #[serde(default)]
    permissions: Option<String>,
}

/// Body of `GET /users/@me/guilds/{id}/member`.
#[derive(Debug, Deserialize)]
struct ServerMember {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    nick: Option<String>,
}

/// Reads servers and member roles with the user's OAuth token.
///
/// Member roles are only requested for tracked servers, which keeps one
/// refresh to a bounded number of calls.
#[derive(Debug, Clone)]
pub struct DiscordIdentityProvider {
    http: reqwest::Client,
    api_base: String,
    tracked_servers: Vec<String>,
}

impl DiscordIdentityProvider {
    pub fn new(
        api_base: impl Into<String>,
        tracked_servers: Vec<String>,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("gt-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tracked_servers,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, IdentityError> {
        let response = self
            .http
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl IdentityProvider for DiscordIdentityProvider {
    #[tracing::instrument(skip(self, access_token))]
    async fn fetch_identity(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<DiscordIdentity, IdentityError> {
        let listed: Vec<PartialServer> = self.get_json("/users/@me/guilds", access_token).await?;

        let mut servers: Vec<DiscordServerMembership> = listed
            .into_iter()
            .map(|server| DiscordServerMembership {
                is_admin: has_administrator(server.permissions.as_deref()),
                is_owner: server.owner,
                server_id: server.id,
                roles: Vec::new(),
            })
            .collect();

        let mut nickname = None;
        for server_id in &self.tracked_servers {
            let Some(index) = servers.iter().position(|s| &s.server_id == server_id) else {
                continue;
            };

            let path = format!("/users/@me/guilds/{server_id}/member");
            match self.get_json::<ServerMember>(&path, access_token).await {
                Ok(member) => {
                    if nickname.is_none() {
                        nickname = member.nick;
                    }
                    servers[index].roles = member.roles;
                }
                Err(e) => {
                    warn!(server_id = %server_id, error = %e, "Failed to fetch member roles");
                }
            }
        }

        Ok(DiscordIdentity { servers, nickname })
    }
}

/// Whether a Discord permission bitfield string includes `ADMINISTRATOR`.
fn has_administrator(permissions: Option<&str>) -> bool {
    permissions
        .and_then(|p| p.parse::<u64>().ok())
        .is_some_and(|bits| bits & ADMINISTRATOR != 0)
}
