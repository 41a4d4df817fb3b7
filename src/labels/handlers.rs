use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, FieldErrors},
    labels::{dto::LabelOut, repo_types::LabelKind},
    payload::{Pagination, Payload, UpdateMode, ValidJson, REQUIRED},
    state::AppState,
};

const NAME_MAX: usize = 255;

/// `/recipe/tags` or `/recipe/ingredients`, depending on `kind`.
pub fn label_routes(kind: LabelKind) -> Router<AppState> {
    let collection = format!("/recipe/{}", kind.plural());
    let item = format!("{collection}/:id");
    Router::new()
        .route(&collection, get(list_labels).post(create_label))
        .route(
            &item,
            get(get_label)
                .put(put_label)
                .patch(patch_label)
                .delete(delete_label),
        )
        .layer(Extension(kind))
}

fn read_name(body: Map<String, Value>, mode: UpdateMode) -> Result<Option<String>, ApiError> {
    let payload = Payload::from(body);
    let mut errors = FieldErrors::new();
    if mode == UpdateMode::Full {
        payload.require("name", &mut errors);
    }
    let name = payload.text("name", NAME_MAX, false, &mut errors);
    errors.finish(name)
}

#[instrument(skip(state, account), fields(account_id = %account.id))]
pub async fn list_labels(
    State(state): State<AppState>,
    Extension(kind): Extension<LabelKind>,
    AuthUser(account): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<LabelOut>>, ApiError> {
    let labels = state.store.list_labels(account.id, kind, p.into()).await?;
    Ok(Json(labels.into_iter().map(LabelOut::from).collect()))
}

/// Find-or-create: 201 for a new label, 200 when the name already existed.
#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn create_label(
    State(state): State<AppState>,
    Extension(kind): Extension<LabelKind>,
    AuthUser(account): AuthUser,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<LabelOut>), ApiError> {
    let name = read_name(body, UpdateMode::Full)?
        .ok_or_else(|| ApiError::Validation(FieldErrors::single("name", REQUIRED)))?;
    let (label, created) = state
        .store
        .find_or_create_label(account.id, kind, &name)
        .await?;
    let status = if created {
        info!(label_id = label.id, kind = ?kind, "label created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(label.into())))
}

#[instrument(skip(state, account), fields(account_id = %account.id))]
pub async fn get_label(
    State(state): State<AppState>,
    Extension(kind): Extension<LabelKind>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<LabelOut>, ApiError> {
    let label = state
        .store
        .get_label(account.id, kind, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(label.into()))
}

async fn update_label(
    state: AppState,
    kind: LabelKind,
    owner: uuid::Uuid,
    id: i64,
    body: Map<String, Value>,
    mode: UpdateMode,
) -> Result<Json<LabelOut>, ApiError> {
    let label = match read_name(body, mode)? {
        Some(name) => state.store.rename_label(owner, kind, id, &name).await?,
        None => state.store.get_label(owner, kind, id).await?,
    };
    let label = label.ok_or(ApiError::NotFound)?;
    info!(label_id = label.id, kind = ?kind, "label updated");
    Ok(Json(label.into()))
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn put_label(
    State(state): State<AppState>,
    Extension(kind): Extension<LabelKind>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<Json<LabelOut>, ApiError> {
    update_label(state, kind, account.id, id, body, UpdateMode::Full).await
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn patch_label(
    State(state): State<AppState>,
    Extension(kind): Extension<LabelKind>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<Json<LabelOut>, ApiError> {
    update_label(state, kind, account.id, id, body, UpdateMode::Partial).await
}

#[instrument(skip(state, account), fields(account_id = %account.id))]
pub async fn delete_label(
    State(state): State<AppState>,
    Extension(kind): Extension<LabelKind>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_label(account.id, kind, id).await? {
        return Err(ApiError::NotFound);
    }
    info!(label_id = id, kind = ?kind, "label deleted");
    Ok(StatusCode::NO_CONTENT)
}
