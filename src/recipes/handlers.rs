use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::{
    auth::{extractors::AuthUser, repo_types::Account},
    error::ApiError,
    payload::{Pagination, Payload, UpdateMode, ValidJson},
    recipes::{
        dto::{RecipeDetails, RecipeListItem},
        reconcile::{parse_create, parse_update},
    },
    state::AppState,
};

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipe/recipes/:id",
            get(get_recipe)
                .put(put_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
}

#[instrument(skip(state, account), fields(account_id = %account.id))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<RecipeListItem>>, ApiError> {
    let recipes = state.store.list_recipes(account.id, p.into()).await?;
    Ok(Json(recipes.into_iter().map(RecipeListItem::from).collect()))
}

#[instrument(skip(state, account), fields(account_id = %account.id))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetails>, ApiError> {
    let recipe = state
        .store
        .get_recipe(account.id, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(recipe.into()))
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<RecipeDetails>), ApiError> {
    let draft = parse_create(&Payload::from(body))?;
    let recipe = state.store.create_recipe(account.id, draft).await?;
    info!(
        recipe_id = recipe.id,
        tags = recipe.tags.len(),
        ingredients = recipe.ingredients.len(),
        "recipe created"
    );
    Ok((StatusCode::CREATED, Json(recipe.into())))
}

async fn update_recipe(
    state: AppState,
    account: Account,
    id: i64,
    body: Map<String, Value>,
    mode: UpdateMode,
) -> Result<Json<RecipeDetails>, ApiError> {
    let patch = parse_update(&Payload::from(body), mode)?;
    let recipe = state
        .store
        .update_recipe(account.id, id, patch)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(recipe_id = recipe.id, ?mode, "recipe updated");
    Ok(Json(recipe.into()))
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn put_recipe(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<Json<RecipeDetails>, ApiError> {
    update_recipe(state, account, id, body, UpdateMode::Full).await
}

#[instrument(skip(state, account, body), fields(account_id = %account.id))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
    ValidJson(body): ValidJson<Map<String, Value>>,
) -> Result<Json<RecipeDetails>, ApiError> {
    update_recipe(state, account, id, body, UpdateMode::Partial).await
}

#[instrument(skip(state, account), fields(account_id = %account.id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(account): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_recipe(account.id, id).await? {
        return Err(ApiError::NotFound);
    }
    info!(recipe_id = id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}
