use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which taxonomy a label belongs to. Both share the same shape and rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Tag,
    Ingredient,
}

impl LabelKind {
    pub const ALL: [LabelKind; 2] = [LabelKind::Tag, LabelKind::Ingredient];

    pub fn table(self) -> &'static str {
        match self {
            LabelKind::Tag => "tags",
            LabelKind::Ingredient => "ingredients",
        }
    }

    /// recipe <-> label attachment table
    pub fn join_table(self) -> &'static str {
        match self {
            LabelKind::Tag => "recipe_tags",
            LabelKind::Ingredient => "recipe_ingredients",
        }
    }

    /// Key used for this category in recipe payloads and as the route segment.
    pub fn plural(self) -> &'static str {
        self.table()
    }

    pub fn noun(self) -> &'static str {
        match self {
            LabelKind::Tag => "tag",
            LabelKind::Ingredient => "ingredient",
        }
    }
}

/// Tag or ingredient record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Label {
    pub id: i64,
    pub user_id: Uuid, // owner
    pub name: String,
}
