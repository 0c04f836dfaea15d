//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs minted at Discord login. Besides the usual `sub`,
//! `iat` and `exp` they carry the login session ID and the Discord OAuth
//! access token used to refresh the identity.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::identity::SessionCredentials;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Discord user ID.
    pub sub: String,
    /// Login session ID.
    pub sid: String,
    /// Discord OAuth access token.
    pub dat: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

impl Claims {
    pub fn credentials(&self) -> ApiResult<SessionCredentials> {
        let issued_at = DateTime::<Utc>::from_timestamp(self.iat, 0).ok_or(ApiError::InvalidToken)?;

        Ok(SessionCredentials {
            session_id: self.sid.clone(),
            user_id: self.sub.clone(),
            access_token: self.dat.clone(),
            issued_at,
        })
    }
}

/// Mint a session token.
pub fn issue_token(
    user_id: &str,
    session_id: &str,
    discord_access_token: &str,
    secret: &str,
    expiry_seconds: i64,
) -> ApiResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        sid: session_id.to_string(),
        dat: discord_access_token.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(expiry_seconds)).timestamp(),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Validate a session token and return its claims.
pub fn validate_token(token: &str, secret: &str) -> ApiResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;

    Ok(data.claims)
}

/// Middleware to require a live session.
///
/// Validates the bearer token, resolves the cached identity (refreshing it
/// when stale) and injects [`IdentityContext`](crate::identity::IdentityContext)
/// and [`SessionCredentials`] into request extensions.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::MissingAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::InvalidAuthHeader)?;

    let claims = validate_token(token, &state.config.jwt_secret)?;
    let credentials = claims.credentials()?;

    let identity = state.identity.resolve(&credentials, Utc::now()).await?;

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(credentials);

    Ok(next.run(request).await)
}
