//! Guild Store
//!
//! Read access to guild records. The resolver only depends on the
//! [`GuildStore`] trait; [`PgGuildStore`] backs it in production and
//! [`MemoryGuildStore`] in tests and local tooling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::models::Guild;

/// Guild store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store cannot serve reads.
    #[error("Guild store unavailable: {0}")]
    Unavailable(String),
}

/// Read operations the access resolver consumes.
#[async_trait]
pub trait GuildStore: Send + Sync {
    /// Find a guild by its in-game ID.
    async fn find_guild_by_id(&self, guild_id: &str) -> Result<Option<Guild>, StoreError>;

    /// List every guild bound to a Discord server.
    async fn find_guilds_by_discord_server(
        &self,
        discord_server_id: &str,
    ) -> Result<Vec<Guild>, StoreError>;
}

const GUILD_COLUMNS: &str = r"
    id, title, discord_server_id, leader_id,
    member_role_id, officer_role_id, leader_role_id,
    access_role_ids, officer_role_ids, default_role_id,
    created_at
";

/// `PostgreSQL` guild store.
#[derive(Debug, Clone)]
pub struct PgGuildStore {
    pool: PgPool,
}

impl PgGuildStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildStore for PgGuildStore {
    #[tracing::instrument(skip(self))]
    async fn find_guild_by_id(&self, guild_id: &str) -> Result<Option<Guild>, StoreError> {
        let query = format!("SELECT {GUILD_COLUMNS} FROM guilds WHERE id = $1");

        let guild = sqlx::query_as::<_, Guild>(&query)
            .bind(guild_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(guild)
    }

    #[tracing::instrument(skip(self))]
    async fn find_guilds_by_discord_server(
        &self,
        discord_server_id: &str,
    ) -> Result<Vec<Guild>, StoreError> {
        let query = format!(
            "SELECT {GUILD_COLUMNS} FROM guilds WHERE discord_server_id = $1 ORDER BY created_at ASC, id ASC"
        );

        let guilds = sqlx::query_as::<_, Guild>(&query)
            .bind(discord_server_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(guilds)
    }
}

/// In-memory guild store.
///
/// [`set_unavailable`](Self::set_unavailable) makes every read fail, which
/// exercises the resolver's fail-closed paths.
#[derive(Debug, Default)]
pub struct MemoryGuildStore {
    guilds: RwLock<Vec<Guild>>,
    unavailable: AtomicBool,
}

impl MemoryGuildStore {
    #[must_use]
    pub fn with_guilds(guilds: impl IntoIterator<Item = Guild>) -> Self {
        Self {
            guilds: RwLock::new(guilds.into_iter().collect()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Guild>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }

        self.guilds
            .read()
            .map_err(|_| StoreError::Unavailable("guild lock poisoned".into()))
    }
}

#[async_trait]
impl GuildStore for MemoryGuildStore {
    async fn find_guild_by_id(&self, guild_id: &str) -> Result<Option<Guild>, StoreError> {
        Ok(self.read()?.iter().find(|g| g.id == guild_id).cloned())
    }

    async fn find_guilds_by_discord_server(
        &self,
        discord_server_id: &str,
    ) -> Result<Vec<Guild>, StoreError> {
        Ok(self
            .read()?
            .iter()
            .filter(|g| g.discord_server_id == discord_server_id)
            .cloned()
            .collect())
    }
}
