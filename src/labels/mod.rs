pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

use repo_types::LabelKind;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::label_routes(LabelKind::Tag))
        .merge(handlers::label_routes(LabelKind::Ingredient))
}
