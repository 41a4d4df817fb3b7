use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{jwt::JwtKeys, repo_types::Account};
use crate::{error::ApiError, state::AppState};

/// Validates the bearer access token and loads the active account behind it.
pub struct AuthUser(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".into())
            })?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "rejected token");
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;

        match state.store.find_account(claims.sub).await? {
            Some(account) if account.is_active => Ok(AuthUser(account)),
            _ => {
                warn!(account_id = %claims.sub, "token for missing or inactive account");
                Err(ApiError::Unauthorized("User not found or inactive".into()))
            }
        }
    }
}
