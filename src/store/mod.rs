use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::repo_types::{Account, AccountPatch, NewAccount},
    labels::repo_types::{Label, LabelKind},
    recipes::{
        reconcile::{RecipeDraft, RecipePatch},
        repo_types::Recipe,
    },
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key rejected the write.
    #[error("{field}: {message}")]
    Conflict { field: &'static str, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn conflict(field: &'static str, message: impl Into<String>) -> Self {
        StoreError::Conflict {
            field,
            message: message.into(),
        }
    }

    /// Deadlock (40P01) or serialization failure (40001): the transaction was
    /// rolled back and may be run again as a whole.
    pub fn is_retryable(&self) -> bool {
        let StoreError::Other(e) = self else {
            return false;
        };
        e.chain()
            .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
            .any(|cause| match cause {
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40P01") | Some("40001"))
                }
                _ => false,
            })
    }

    /// Unique violations become `Conflict` on `field`, anything else is `Other`.
    pub fn from_sqlx(e: sqlx::Error, field: &'static str, message: impl Into<String>) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::conflict(field, message)
            }
            _ => StoreError::Other(e.into()),
        }
    }
}

/// Persistence used by the handlers. Every method is scoped to `owner` where a
/// record has one; records of other owners behave as if they did not exist.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError>;
    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn update_account(
        &self,
        id: Uuid,
        patch: AccountPatch,
    ) -> Result<Option<Account>, StoreError>;
    /// Deletes the account together with its recipes and labels.
    async fn delete_account(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list_recipes(&self, owner: Uuid, page: Page) -> Result<Vec<Recipe>, StoreError>;
    async fn get_recipe(&self, owner: Uuid, id: i64) -> Result<Option<Recipe>, StoreError>;
    /// Inserts the recipe, then reconciles tags and ingredients. All or nothing.
    async fn create_recipe(&self, owner: Uuid, draft: RecipeDraft) -> Result<Recipe, StoreError>;
    /// Applies scalar changes and label replacements. All or nothing.
    async fn update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        patch: RecipePatch,
    ) -> Result<Option<Recipe>, StoreError>;
    async fn delete_recipe(&self, owner: Uuid, id: i64) -> Result<bool, StoreError>;

    /// Sorted by name, descending.
    async fn list_labels(
        &self,
        owner: Uuid,
        kind: LabelKind,
        page: Page,
    ) -> Result<Vec<Label>, StoreError>;
    async fn get_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
    ) -> Result<Option<Label>, StoreError>;
    /// Returns the label and whether it was created by this call.
    async fn find_or_create_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        name: &str,
    ) -> Result<(Label, bool), StoreError>;
    async fn rename_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
        name: &str,
    ) -> Result<Option<Label>, StoreError>;
    async fn delete_label(&self, owner: Uuid, kind: LabelKind, id: i64)
        -> Result<bool, StoreError>;
}
