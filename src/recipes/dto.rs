use rust_decimal::Decimal;
use serde::Serialize;

use super::repo_types::Recipe;
use crate::labels::dto::LabelOut;

/// List representation; the description only shows up on the detail view.
#[derive(Debug, Serialize)]
pub struct RecipeListItem {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<LabelOut>,
    pub ingredients: Vec<LabelOut>,
}

#[derive(Debug, Serialize)]
pub struct RecipeDetails {
    #[serde(flatten)]
    pub summary: RecipeListItem,
    pub description: String,
}

impl From<Recipe> for RecipeListItem {
    fn from(r: Recipe) -> Self {
        Self {
            id: r.id,
            title: r.title,
            time_minutes: r.time_minutes,
            price: r.price,
            link: r.link,
            tags: r.tags.into_iter().map(LabelOut::from).collect(),
            ingredients: r.ingredients.into_iter().map(LabelOut::from).collect(),
        }
    }
}

impl From<Recipe> for RecipeDetails {
    fn from(mut r: Recipe) -> Self {
        let description = std::mem::take(&mut r.description);
        Self {
            summary: r.into(),
            description,
        }
    }
}
