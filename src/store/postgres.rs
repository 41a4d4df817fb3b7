use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Page, Store, StoreError};
use crate::{
    auth::repo_types::{Account, AccountPatch, NewAccount},
    config::AppConfig,
    labels::{
        self,
        repo_types::{Label, LabelKind},
    },
    recipes::{
        self,
        reconcile::{apply_label_change, reconcile_labels, RecipeDraft, RecipePatch},
        repo_types::Recipe,
    },
};

/// Recipe writes aborted by a deadlock or serialization failure run once more.
const MAX_ATTEMPTS: u32 = 2;

/// Postgres-backed store. Each mutating call runs in its own transaction.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        info!("database ready");
        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    async fn try_create_recipe(
        &self,
        owner: Uuid,
        draft: &RecipeDraft,
    ) -> Result<Recipe, StoreError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let row = recipes::repo::insert(&mut tx, owner, draft).await?;
        for kind in LabelKind::ALL {
            reconcile_labels(&mut tx, owner, row.id, kind, draft.names(kind)).await?;
        }
        let recipe = recipes::repo::get(&mut tx, owner, row.id)
            .await?
            .context("recipe vanished inside its own transaction")?;
        tx.commit().await.context("commit tx")?;
        Ok(recipe)
    }

    async fn try_update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        patch: &RecipePatch,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        if !recipes::repo::lock(&mut tx, owner, id).await? {
            return Ok(None);
        }
        recipes::repo::update_scalars(&mut tx, owner, id, patch).await?;
        for kind in LabelKind::ALL {
            apply_label_change(&mut tx, owner, id, kind, patch.change(kind)).await?;
        }
        let recipe = recipes::repo::get(&mut tx, owner, id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(recipe)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        Account::create(&self.db, &new).await
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(Account::find(&self.db, id).await?)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(Account::find_by_email(&self.db, email).await?)
    }

    async fn update_account(
        &self,
        id: Uuid,
        patch: AccountPatch,
    ) -> Result<Option<Account>, StoreError> {
        Account::update(&self.db, id, &patch).await
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let deleted = Account::delete_cascade(&mut tx, id).await?;
        tx.commit().await.context("commit tx")?;
        Ok(deleted)
    }

    async fn list_recipes(&self, owner: Uuid, page: Page) -> Result<Vec<Recipe>, StoreError> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        Ok(recipes::repo::list_by_user(&mut conn, owner, page).await?)
    }

    async fn get_recipe(&self, owner: Uuid, id: i64) -> Result<Option<Recipe>, StoreError> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        Ok(recipes::repo::get(&mut conn, owner, id).await?)
    }

    async fn create_recipe(&self, owner: Uuid, draft: RecipeDraft) -> Result<Recipe, StoreError> {
        let mut attempt = 1;
        loop {
            match self.try_create_recipe(owner, &draft).await {
                Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                    warn!(%owner, attempt, error = %e, "create recipe aborted, retrying");
                    attempt += 1;
                }
                res => return res,
            }
        }
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        patch: RecipePatch,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut attempt = 1;
        loop {
            match self.try_update_recipe(owner, id, &patch).await {
                Err(e) if attempt < MAX_ATTEMPTS && e.is_retryable() => {
                    warn!(%owner, recipe_id = id, attempt, error = %e, "update recipe aborted, retrying");
                    attempt += 1;
                }
                res => return res,
            }
        }
    }

    async fn delete_recipe(&self, owner: Uuid, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        Ok(recipes::repo::delete(&mut conn, owner, id).await?)
    }

    async fn list_labels(
        &self,
        owner: Uuid,
        kind: LabelKind,
        page: Page,
    ) -> Result<Vec<Label>, StoreError> {
        Ok(labels::repo::list_by_user(&self.db, owner, kind, page).await?)
    }

    async fn get_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
    ) -> Result<Option<Label>, StoreError> {
        Ok(labels::repo::get(&self.db, owner, kind, id).await?)
    }

    async fn find_or_create_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        name: &str,
    ) -> Result<(Label, bool), StoreError> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        Ok(labels::repo::find_or_create(&mut conn, owner, kind, name).await?)
    }

    async fn rename_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
        name: &str,
    ) -> Result<Option<Label>, StoreError> {
        labels::repo::rename(&self.db, owner, kind, id, name).await
    }

    async fn delete_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
    ) -> Result<bool, StoreError> {
        Ok(labels::repo::delete(&self.db, owner, kind, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::reconcile::LabelChange;
    use rust_decimal::Decimal;

    async fn account(store: &PgStore, email: &str) -> Account {
        store
            .create_account(NewAccount {
                email: email.into(),
                password_hash: "x".into(),
                name: "Test".into(),
                is_staff: false,
                is_superuser: false,
            })
            .await
            .expect("create account")
    }

    fn draft(tags: &[&str]) -> RecipeDraft {
        RecipeDraft {
            title: "Thai Prawn Curry".into(),
            time_minutes: 30,
            price: Decimal::new(250, 2),
            link: String::new(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ingredients: vec![],
        }
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_find_or_create_yields_one_row(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let owner = account(&store, "race@example.com").await.id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .find_or_create_label(owner, LabelKind::Tag, "Thai")
                    .await
                    .expect("find or create")
            }));
        }
        let mut ids = Vec::new();
        let mut created = 0;
        for h in handles {
            let (label, was_created) = h.await.expect("join");
            ids.push(label.id);
            created += was_created as usize;
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_recipes_with_reversed_tags_share_labels(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let owner = account(&store, "busy@example.com").await.id;

        for _ in 0..5 {
            let (a, b) = (store.clone(), store.clone());
            let first = tokio::spawn(async move {
                a.create_recipe(owner, draft(&["Thai", "Dinner", "Spicy"])).await
            });
            let second = tokio::spawn(async move {
                b.create_recipe(owner, draft(&["Spicy", "Dinner", "Thai"])).await
            });
            let first = first.await.expect("join").expect("first create");
            let second = second.await.expect("join").expect("second create");
            assert_eq!(first.tags.len(), 3);
            assert_eq!(
                first.tags.iter().map(|t| t.id).collect::<Vec<_>>(),
                second.tags.iter().map(|t| t.id).collect::<Vec<_>>()
            );
        }

        let tags = store
            .list_labels(owner, LabelKind::Tag, Page::default())
            .await
            .expect("list");
        assert_eq!(tags.len(), 3);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_updates_with_reversed_tags_succeed(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let owner = account(&store, "edits@example.com").await.id;
        let one = store.create_recipe(owner, draft(&[])).await.expect("create").id;
        let two = store.create_recipe(owner, draft(&[])).await.expect("create").id;

        let replace = |names: &[&str]| RecipePatch {
            tags: LabelChange::Replace(names.iter().map(|n| n.to_string()).collect()),
            ..Default::default()
        };
        let (a, b) = (store.clone(), store.clone());
        let (pa, pb) = (replace(&["Thai", "Dinner"]), replace(&["Dinner", "Thai"]));
        let first = tokio::spawn(async move { a.update_recipe(owner, one, pa).await });
        let second = tokio::spawn(async move { b.update_recipe(owner, two, pb).await });
        let first = first.await.expect("join").expect("first update").expect("found");
        let second = second.await.expect("join").expect("second update").expect("found");
        assert_eq!(first.tags.len(), 2);
        assert_eq!(second.tags.len(), 2);

        let tags = store
            .list_labels(owner, LabelKind::Tag, Page::default())
            .await
            .expect("list");
        assert_eq!(tags.len(), 2);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn replace_clears_and_reuses_labels(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        let owner = account(&store, "chef@example.com").await.id;

        let recipe = store
            .create_recipe(owner, draft(&["Thai", "Dinner"]))
            .await
            .expect("create");
        assert_eq!(recipe.tags.len(), 2);

        let patch = RecipePatch {
            tags: LabelChange::Replace(vec!["Thai".into()]),
            ..Default::default()
        };
        let updated = store
            .update_recipe(owner, recipe.id, patch)
            .await
            .expect("update")
            .expect("found");
        assert_eq!(updated.tags.len(), 1);
        assert_eq!(updated.tags[0].id, recipe.tags.iter().find(|t| t.name == "Thai").unwrap().id);

        let all = store
            .list_labels(owner, LabelKind::Tag, Page::default())
            .await
            .expect("list");
        assert_eq!(all.len(), 2);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn deleting_account_removes_recipes(pool: PgPool) {
        let store = PgStore::from_pool(pool.clone());
        let owner = account(&store, "gone@example.com").await.id;
        store.create_recipe(owner, draft(&["Thai"])).await.expect("create");

        assert!(store.delete_account(owner).await.expect("delete"));

        let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE user_id = $1")
            .bind(owner)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(left, 0);
    }
}
