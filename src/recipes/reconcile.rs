//! Nested recipe writes.
//!
//! A recipe payload carries scalar fields plus `tags` / `ingredients` lists of
//! `{name}` objects. Writes happen in two phases:
//!
//! 1. [`parse_create`] / [`parse_update`] validate the whole payload and produce a
//!    typed [`RecipeDraft`] or [`RecipePatch`]. Nothing touches the store until this
//!    succeeds, so a bad field can never leave a half-written recipe behind.
//! 2. The store applies the draft inside one transaction, calling
//!    [`reconcile_labels`] per category: each name is found-or-created for the owner
//!    and attached to the recipe.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{ApiError, FieldErrors},
    labels::{
        repo,
        repo_types::{Label, LabelKind},
    },
    payload::{Payload, UpdateMode},
};

pub const TITLE_MAX: usize = 255;
pub const LINK_MAX: usize = 255;
pub const DESCRIPTION_MAX: usize = 10_000;
pub const PRICE_DIGITS: u32 = 5;
pub const PRICE_PLACES: u32 = 2;

/// What an update does to one label category.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LabelChange {
    /// Key absent from the payload: attachments stay as they are.
    #[default]
    Keep,
    /// Key present: detach everything, then attach exactly these names.
    Replace(Vec<String>),
}

/// Fully validated input for a new recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub description: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
}

impl RecipeDraft {
    pub fn names(&self, kind: LabelKind) -> &[String] {
        match kind {
            LabelKind::Tag => &self.tags,
            LabelKind::Ingredient => &self.ingredients,
        }
    }
}

/// Fully validated changes to an existing recipe. `None` leaves a column as is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecipePatch {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub tags: LabelChange,
    pub ingredients: LabelChange,
}

impl RecipePatch {
    pub fn change(&self, kind: LabelKind) -> &LabelChange {
        match kind {
            LabelKind::Tag => &self.tags,
            LabelKind::Ingredient => &self.ingredients,
        }
    }
}

struct Scalars {
    title: Option<String>,
    time_minutes: Option<i32>,
    price: Option<Decimal>,
    link: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    ingredients: Option<Vec<String>>,
}

// `user` and `id` are not read here, so an attempt to move a recipe to another
// owner is dropped with the rest of the unknown keys.
fn read_fields(payload: &Payload, required: bool, errors: &mut FieldErrors) -> Scalars {
    if required {
        for key in ["title", "time_minutes", "price"] {
            payload.require(key, errors);
        }
    }
    Scalars {
        title: payload.text("title", TITLE_MAX, false, errors),
        time_minutes: payload.non_negative_int("time_minutes", errors),
        price: payload.decimal("price", PRICE_DIGITS, PRICE_PLACES, errors),
        link: payload.text("link", LINK_MAX, true, errors),
        description: payload.text("description", DESCRIPTION_MAX, true, errors),
        tags: payload.names(LabelKind::Tag.plural(), errors),
        ingredients: payload.names(LabelKind::Ingredient.plural(), errors),
    }
}

/// Validates a create payload.
pub fn parse_create(payload: &Payload) -> Result<RecipeDraft, ApiError> {
    let mut errors = FieldErrors::new();
    let s = read_fields(payload, true, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    match (s.title, s.time_minutes, s.price) {
        (Some(title), Some(time_minutes), Some(price)) => Ok(RecipeDraft {
            title,
            time_minutes,
            price,
            link: s.link.unwrap_or_default(),
            description: s.description.unwrap_or_default(),
            tags: s.tags.unwrap_or_default(),
            ingredients: s.ingredients.unwrap_or_default(),
        }),
        _ => Err(ApiError::Validation(FieldErrors::single(
            "non_field_errors",
            "Invalid data.",
        ))),
    }
}

/// Validates an update payload.
pub fn parse_update(payload: &Payload, mode: UpdateMode) -> Result<RecipePatch, ApiError> {
    let mut errors = FieldErrors::new();
    let s = read_fields(payload, mode == UpdateMode::Full, &mut errors);
    errors.finish(RecipePatch {
        title: s.title,
        time_minutes: s.time_minutes,
        price: s.price,
        link: s.link,
        description: s.description,
        tags: s.tags.map(LabelChange::Replace).unwrap_or_default(),
        ingredients: s.ingredients.map(LabelChange::Replace).unwrap_or_default(),
    })
}

/// Names in the order their rows are touched: sorted, without duplicates.
///
/// Every transaction creating or locking labels goes through this order, so two
/// requests naming the same labels in different orders cannot deadlock.
pub fn lock_order(names: &[String]) -> BTreeSet<&str> {
    names.iter().map(String::as_str).collect()
}

/// Finds or creates each named label for `owner` and attaches it to the recipe.
///
/// Runs on the caller's transaction. Concurrent requests naming the same label
/// end up sharing one row through the `(user_id, name)` key.
pub async fn reconcile_labels(
    conn: &mut PgConnection,
    owner: Uuid,
    recipe_id: i64,
    kind: LabelKind,
    names: &[String],
) -> anyhow::Result<Vec<Label>> {
    let mut attached = Vec::with_capacity(names.len());
    for name in lock_order(names) {
        let (label, created) = repo::find_or_create(&mut *conn, owner, kind, name).await?;
        repo::attach(&mut *conn, owner, recipe_id, kind, label.id).await?;
        debug!(%owner, recipe_id, kind = ?kind, label_id = label.id, created, "label attached");
        attached.push(label);
    }
    Ok(attached)
}

/// Applies one category of a patch: `Keep` is a no-op, `Replace` clears then reconciles.
pub async fn apply_label_change(
    conn: &mut PgConnection,
    owner: Uuid,
    recipe_id: i64,
    kind: LabelKind,
    change: &LabelChange,
) -> anyhow::Result<()> {
    if let LabelChange::Replace(names) = change {
        repo::detach_all(&mut *conn, recipe_id, kind).await?;
        reconcile_labels(conn, owner, recipe_id, kind, names).await?;
    }
    Ok(())
}
