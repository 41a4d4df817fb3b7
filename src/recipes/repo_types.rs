use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::labels::repo_types::Label;

/// Scalar columns of a recipe as stored in `recipes`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeRow {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub created_at: OffsetDateTime,
}

impl RecipeRow {
    pub fn with_labels(self, tags: Vec<Label>, ingredients: Vec<Label>) -> Recipe {
        Recipe {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            time_minutes: self.time_minutes,
            price: self.price,
            link: self.link,
            created_at: self.created_at,
            tags,
            ingredients,
        }
    }
}

/// A recipe together with its attached labels, both sorted by name.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub created_at: OffsetDateTime,
    pub tags: Vec<Label>,
    pub ingredients: Vec<Label>,
}
