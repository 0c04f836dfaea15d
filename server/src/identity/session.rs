//! Session-cached identity.
//!
//! Each login session keeps one [`IdentitySession`]. The context is rebuilt
//! from the identity provider when the refresh interval has passed, and the
//! session stops resolving once its lifetime, counted from token issue time,
//! is over.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::discord::IdentityProvider;
use super::permissions::GlobalRoleConfig;
use super::IdentityContext;
use crate::config::Config;

/// Session lifetime and refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub ttl: Duration,
    pub refresh_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(4),
            refresh_interval: Duration::minutes(30),
        }
    }
}

impl SessionTiming {
    #[must_use]
    /// Out-of-range values collapse to zero, which expires every session.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl: Duration::try_seconds(config.session_ttl_secs).unwrap_or_else(Duration::zero),
            refresh_interval: Duration::try_seconds(config.session_refresh_secs)
                .unwrap_or_else(Duration::zero),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session expired")]
    Expired,
}

/// What a request presents to resolve its session.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub session_id: String,
    pub user_id: String,
    /// Discord OAuth access token.
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
}

/// Cached identity for one login session.
#[derive(Debug, Clone)]
pub struct IdentitySession {
    context: IdentityContext,
    refreshed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    refresh_interval: Duration,
}

impl IdentitySession {
    #[must_use]
    pub fn new(
        context: IdentityContext,
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            context,
            refreshed_at: now,
            // Overflow leaves the session already expired.
            expires_at: issued_at.checked_add_signed(timing.ttl).unwrap_or(issued_at),
            refresh_interval: timing.refresh_interval,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &IdentityContext {
        &self.context
    }

    #[must_use]
    pub const fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now - self.refreshed_at >= self.refresh_interval
    }

    /// Replace the context. The session lifetime is not extended.
    pub fn refresh(&mut self, context: IdentityContext, now: DateTime<Utc>) {
        self.context = context;
        self.refreshed_at = now;
    }
}

/// Resolves and caches identity contexts per session.
pub struct IdentityService {
    provider: Arc<dyn IdentityProvider>,
    sessions: DashMap<String, IdentitySession>,
    global_roles: GlobalRoleConfig,
    tracked_servers: Vec<String>,
    timing: SessionTiming,
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("sessions", &self.sessions.len())
            .field("tracked_servers", &self.tracked_servers)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl IdentityService {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        global_roles: GlobalRoleConfig,
        tracked_servers: Vec<String>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            provider,
            sessions: DashMap::new(),
            global_roles,
            tracked_servers,
            timing,
        }
    }

    #[must_use]
    pub fn from_config(provider: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        Self::new(
            provider,
            config.global_roles.clone(),
            config.discord_server_ids.clone(),
            SessionTiming::from_config(config),
        )
    }

    /// Resolve the identity for a request.
    ///
    /// Serves the cached context while it is fresh, refreshes it from the
    /// provider when stale or missing.
    pub async fn resolve(
        &self,
        credentials: &SessionCredentials,
        now: DateTime<Utc>,
    ) -> Result<IdentityContext, SessionError> {
        self.ensure_live(credentials, now)?;

        if let Some(session) = self.sessions.get(&credentials.session_id) {
            if !session.needs_refresh(now) {
                return Ok(session.context().clone());
            }
        }

        let session = self.refresh(credentials, now).await?;
        Ok(session.context().clone())
    }

    /// Rebuild the context from the provider regardless of its age.
    pub async fn refresh(
        &self,
        credentials: &SessionCredentials,
        now: DateTime<Utc>,
    ) -> Result<IdentitySession, SessionError> {
        self.ensure_live(credentials, now)?;

        let context = self.fetch_context(credentials).await;

        let session = self
            .sessions
            .entry(credentials.session_id.clone())
            .and_modify(|session| session.refresh(context.clone(), now))
            .or_insert_with(|| {
                IdentitySession::new(context.clone(), credentials.issued_at, now, self.timing)
            })
            .clone();

        debug!(
            user_id = %credentials.user_id,
            servers = session.context().server_ids.len(),
            "Identity refreshed"
        );

        Ok(session)
    }

    /// Drop a session from the cache.
    pub fn invalidate(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        removed
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn ensure_live(
        &self,
        credentials: &SessionCredentials,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let live = credentials
            .issued_at
            .checked_add_signed(self.timing.ttl)
            .is_some_and(|expires_at| now < expires_at);

        if !live {
            self.sessions.remove(&credentials.session_id);
            return Err(SessionError::Expired);
        }
        Ok(())
    }

    /// Provider failures produce an empty context.
    async fn fetch_context(&self, credentials: &SessionCredentials) -> IdentityContext {
        match self
            .provider
            .fetch_identity(&credentials.user_id, &credentials.access_token)
            .await
        {
            Ok(identity) => IdentityContext::from_identity(
                credentials.user_id.clone(),
                &identity,
                &self.global_roles,
                &self.tracked_servers,
            ),
            Err(e) => {
                warn!(user_id = %credentials.user_id, error = %e, "Failed to fetch Discord identity");
                IdentityContext::empty(credentials.user_id.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::identity::{DiscordIdentity, DiscordServerMembership, IdentityError};

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn fetch_identity(
            &self,
            _user_id: &str,
            _access_token: &str,
        ) -> Result<DiscordIdentity, IdentityError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IdentityError::Status(503));
            }
            Ok(DiscordIdentity {
                servers: vec![DiscordServerMembership {
                    server_id: "S1".into(),
                    is_owner: false,
                    is_admin: false,
                    roles: vec![format!("R{call}")],
                }],
                nickname: None,
            })
        }
    }

    fn credentials(issued_at: DateTime<Utc>) -> SessionCredentials {
        SessionCredentials {
            session_id: "sid-1".into(),
            user_id: "u1".into(),
            access_token: "discord-token".into(),
            issued_at,
        }
    }

    fn service(provider: Arc<CountingProvider>) -> IdentityService {
        IdentityService::new(
            provider,
            GlobalRoleConfig::default(),
            vec!["S1".into()],
            SessionTiming::default(),
        )
    }

    #[test]
    fn test_session_timing() {
        let now = Utc::now();
        let session = IdentitySession::new(
            IdentityContext::empty("u1"),
            now,
            now,
            SessionTiming::default(),
        );

        assert!(!session.needs_refresh(now + Duration::minutes(29)));
        assert!(session.needs_refresh(now + Duration::minutes(30)));
        assert!(!session.is_expired(now + Duration::minutes(239)));
        assert!(session.is_expired(now + Duration::hours(4)));
    }

    #[test]
    fn test_refresh_keeps_expiry() {
        let now = Utc::now();
        let mut session = IdentitySession::new(
            IdentityContext::empty("u1"),
            now,
            now,
            SessionTiming::default(),
        );
        let expires_at = session.expires_at();

        let later = now + Duration::hours(1);
        session.refresh(IdentityContext::empty("u1"), later);

        assert_eq!(session.refreshed_at(), later);
        assert_eq!(session.expires_at(), expires_at);
    }

    #[tokio::test]
    async fn test_resolve_caches_until_refresh_interval() {
        let provider = Arc::new(CountingProvider::default());
        let service = service(provider.clone());
        let now = Utc::now();
        let creds = credentials(now);

        let first = service.resolve(&creds, now).await.unwrap();
        let second = service
            .resolve(&creds, now + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(first.roles_on("S1"), ["R0"]);

        let refreshed = service
            .resolve(&creds, now + Duration::minutes(31))
            .await
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.roles_on("S1"), ["R1"]);
        assert_eq!(service.session_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_rejects_expired_session() {
        let provider = Arc::new(CountingProvider::default());
        let service = service(provider.clone());
        let now = Utc::now();
        let creds = credentials(now);

        service.resolve(&creds, now).await.unwrap();
        let result = service.resolve(&creds, now + Duration::hours(4)).await;

        assert_eq!(result, Err(SessionError::Expired));
        assert_eq!(service.session_count(), 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_is_empty_context() {
        let provider = Arc::new(CountingProvider {
            fail: true,
            ..CountingProvider::default()
        });
        let service = service(provider);
        let now = Utc::now();

        let ctx = service.resolve(&credentials(now), now).await.unwrap();
        assert_eq!(ctx, IdentityContext::empty("u1"));
    }

    #[tokio::test]
    async fn test_forced_refresh_and_invalidate() {
        let provider = Arc::new(CountingProvider::default());
        let service = service(provider.clone());
        let now = Utc::now();
        let creds = credentials(now);

        service.resolve(&creds, now).await.unwrap();
        let session = service.refresh(&creds, now).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.context().roles_on("S1"), ["R1"]);

        service.invalidate("sid-1");
        assert_eq!(service.session_count(), 0);
    }

    #[test]
    fn test_out_of_range_timing_collapses_to_zero() {
        let config = Config {
            session_ttl_secs: i64::MAX,
            session_refresh_secs: i64::MIN,
            ..Config::default_for_test()
        };

        let timing = SessionTiming::from_config(&config);
        assert_eq!(timing.ttl, Duration::zero());
        assert_eq!(timing.refresh_interval, Duration::zero());
    }

    #[tokio::test]
    async fn test_overflowing_ttl_is_expired() {
        let provider = Arc::new(CountingProvider::default());
        let service = IdentityService::new(
            provider.clone(),
            GlobalRoleConfig::default(),
            vec!["S1".into()],
            SessionTiming {
                ttl: Duration::MAX,
                refresh_interval: Duration::minutes(30),
            },
        );
        let now = Utc::now();

        let result = service.resolve(&credentials(now), now).await;
        assert_eq!(result, Err(SessionError::Expired));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        let session = IdentitySession::new(
            IdentityContext::empty("u1"),
            now,
            now,
            SessionTiming {
                ttl: Duration::MAX,
                refresh_interval: Duration::minutes(30),
            },
        );
        assert!(session.is_expired(now));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let provider = Arc::new(CountingProvider::default());
        let service = service(provider);
        let now = Utc::now();

        service.resolve(&credentials(now), now).await.unwrap();
        assert_eq!(service.purge_expired(now + Duration::hours(1)), 0);
        assert_eq!(service.purge_expired(now + Duration::hours(5)), 1);
        assert_eq!(service.session_count(), 0);
    }
}
