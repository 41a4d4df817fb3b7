use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AdminUser, AuthResponse, PublicUser, RefreshRequest, TokenRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        repo_types::Account,
        services::{self, BAD_CREDENTIALS},
    },
    error::{ApiError, FieldErrors},
    payload::{Payload, UpdateMode, ValidJson},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/user/create", post(register))
        .route("/user/token", post(issue_token))
        .route("/user/token/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/user/me", get(get_me).put(put_me).patch(patch_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", post(admin_create_user))
        .route("/admin/users/:id", delete(admin_delete_user))
}

fn token_response(state: &AppState, account: Account) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let pair = keys.sign_pair(account.id)?;
    Ok(Json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: account.into(),
    }))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let registration = services::parse_registration(&Payload::from(body))?;
    let account = services::create_account(state.store.as_ref(), registration, false, false).await?;
    info!(account_id = %account.id, email = %account.email, "user registered");
    Ok((StatusCode::CREATED, Json(account.into())))
}

#[instrument(skip(state, payload))]
pub async fn issue_token(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<TokenRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let account = services::authenticate(state.store.as_ref(), &payload.email, &payload.password)
        .await?
        .ok_or_else(|| {
            ApiError::Validation(FieldErrors::single("non_field_errors", BAD_CREDENTIALS))
        })?;
    info!(account_id = %account.id, "token issued");
    token_response(&state, account)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        ApiError::Unauthorized("Invalid or expired refresh token".into())
    })?;

    let account = state
        .store
        .find_account(claims.sub)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(|| ApiError::Unauthorized("User not found or inactive".into()))?;
    token_response(&state, account)
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(account): AuthUser) -> Json<PublicUser> {
    Json(account.into())
}

async fn update_me(
    state: AppState,
    account: Account,
    body: Map<String, Value>,
    mode: UpdateMode,
) -> Result<Json<PublicUser>, ApiError> {
    let update = services::parse_profile_update(&Payload::from(body), mode)?;
    let updated = services::update_profile(state.store.as_ref(), &account, update).await?;
    Ok(Json(updated.into()))
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn put_me(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<Json<PublicUser>, ApiError> {
    update_me(state, account, body, UpdateMode::Full).await
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn patch_me(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<Json<PublicUser>, ApiError> {
    update_me(state, account, body, UpdateMode::Partial).await
}

// The admin surface answers 404 to everyone but superusers.
fn require_superuser(account: &Account) -> Result<(), ApiError> {
    if account.is_superuser {
        Ok(())
    } else {
        warn!(account_id = %account.id, "admin route hit by non-superuser");
        Err(ApiError::NotFound)
    }
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn admin_create_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<AdminUser>), ApiError> {
    require_superuser(&admin)?;
    let payload = Payload::from(body);
    let registration = services::parse_registration(&payload)?;
    let flag = |key: &str| payload.get(key).and_then(Value::as_bool).unwrap_or(false);
    let is_superuser = flag("is_superuser");
    let is_staff = flag("is_staff") || is_superuser;
    let account =
        services::create_account(state.store.as_ref(), registration, is_staff, is_superuser)
            .await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn admin_delete_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_superuser(&admin)?;
    if !state.store.delete_account(id).await? {
        return Err(ApiError::NotFound);
    }
    info!(account_id = %id, "account deleted with its recipes and labels");
    Ok(StatusCode::NO_CONTENT)
}
