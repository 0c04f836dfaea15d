//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router, backed
//! by an in-memory guild store and a static identity provider. No database or
//! Discord access is needed.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, header, Method, Request, Response, StatusCode};
use axum::Router;
use gt_server::access::{AccessPolicy, AccessResolver, Guild, MemoryGuildStore};
use gt_server::api::auth::issue_token;
use gt_server::api::{create_router, AppState};
use gt_server::config::Config;
use gt_server::identity::{
    DiscordIdentity, DiscordServerMembership, IdentityError, IdentityProvider, IdentityService,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Discord server tracked by the test config.
pub const SERVER: &str = "S1";

// ============================================================================
// Identity fixtures
// ============================================================================

/// Identity provider answering from a fixed table.
///
/// Unknown users get an error, the same as a revoked Discord token.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    identities: HashMap<String, DiscordIdentity>,
    calls: AtomicUsize,
}

impl StaticIdentityProvider {
    pub fn new(identities: impl IntoIterator<Item = (String, DiscordIdentity)>) -> Self {
        Self {
            identities: identities.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch_identity` calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn fetch_identity(
        &self,
        user_id: &str,
        _access_token: &str,
    ) -> Result<DiscordIdentity, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.identities
            .get(user_id)
            .cloned()
            .ok_or(IdentityError::Status(401))
    }
}

/// Identity of a user on `SERVER` holding `roles`.
pub fn member_of(roles: &[&str]) -> DiscordIdentity {
    DiscordIdentity {
        servers: vec![DiscordServerMembership {
            server_id: SERVER.into(),
            is_owner: false,
            is_admin: false,
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        }],
        nickname: None,
    }
}

/// Identity of the owner of `SERVER`.
pub fn owner_of_server() -> DiscordIdentity {
    DiscordIdentity {
        servers: vec![DiscordServerMembership {
            server_id: SERVER.into(),
            is_owner: true,
            is_admin: false,
            roles: Vec::new(),
        }],
        nickname: Some("Owner".into()),
    }
}

// ============================================================================
// Guild fixtures
// ============================================================================

/// Guild on `SERVER` with only the automatic member role set.
pub fn guild_with_member_role(id: &str, role: &str) -> Guild {
    let mut guild = Guild::new(id, id.to_uppercase(), SERVER);
    guild.member_role_id = Some(role.into());
    guild
}

/// Shift creation times so guilds list in the given order.
pub fn in_creation_order(mut guilds: Vec<Guild>) -> Vec<Guild> {
    let base = chrono::Utc::now() - chrono::Duration::hours(1);
    for (i, guild) in guilds.iter_mut().enumerate() {
        guild.created_at = base + chrono::Duration::seconds(i64::try_from(i).unwrap());
    }
    guilds
}

// ============================================================================
// Test App
// ============================================================================

/// Build the config used by HTTP tests.
pub fn test_config() -> Config {
    Config {
        discord_server_ids: vec![SERVER.into()],
        ..Config::default_for_test()
    }
}

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryGuildStore>,
    pub provider: Arc<StaticIdentityProvider>,
    pub identity: Arc<IdentityService>,
    pub config: Arc<Config>,
}

impl TestApp {
    /// Create a test app with the default test config.
    pub fn new(
        guilds: Vec<Guild>,
        identities: impl IntoIterator<Item = (&'static str, DiscordIdentity)>,
    ) -> Self {
        Self::with_config(test_config(), guilds, identities)
    }

    /// Create a test app with a custom config.
    pub fn with_config(
        config: Config,
        guilds: Vec<Guild>,
        identities: impl IntoIterator<Item = (&'static str, DiscordIdentity)>,
    ) -> Self {
        let store = Arc::new(MemoryGuildStore::with_guilds(guilds));
        let provider = Arc::new(StaticIdentityProvider::new(
            identities
                .into_iter()
                .map(|(user, identity)| (user.to_string(), identity)),
        ));

        let resolver = AccessResolver::new(store.clone(), AccessPolicy::from_config(&config));
        let identity = IdentityService::from_config(provider.clone(), &config);
        let state = AppState::new(resolver, identity, config.clone());
        let identity = state.identity.clone();
        let router = create_router(state);

        Self {
            router,
            store,
            provider,
            identity,
            config: Arc::new(config),
        }
    }

    /// Mint a bearer token for `user_id`, one session per user.
    pub fn token_for(&self, user_id: &str) -> String {
        issue_token(
            user_id,
            &format!("sid-{user_id}"),
            "discord-access-token",
            &self.config.jwt_secret,
            3600,
        )
        .expect("Failed to issue token")
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// Send an authenticated request and decode the JSON body.
    pub async fn send_as(
        &self,
        method: Method,
        uri: &str,
        user_id: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = Self::request(method, uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token_for(user_id)))
            .body(Body::empty())
            .unwrap();

        let response = self.oneshot(request).await;
        let status = response.status();
        (status, body_to_json(response).await)
    }

    /// Authenticated GET.
    pub async fn get_as(&self, uri: &str, user_id: &str) -> (StatusCode, serde_json::Value) {
        self.send_as(Method::GET, uri, user_id).await
    }
}

/// Read a response body as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}
