//! In-process store backing the test suite. Mirrors the Postgres rules:
//! `(owner, name)` uniqueness per label kind, owner scoping, ordering, and the
//! account cascade.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Page, Store, StoreError};
use crate::{
    auth::repo_types::{Account, AccountPatch, NewAccount},
    labels::repo_types::{Label, LabelKind},
    recipes::{
        reconcile::{LabelChange, RecipeDraft, RecipePatch},
        repo_types::{Recipe, RecipeRow},
    },
};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<Uuid, Account>,
    recipes: BTreeMap<i64, RecipeRow>,
    labels: HashMap<LabelKind, BTreeMap<i64, Label>>,
    // (kind, recipe_id) -> label ids
    attached: HashMap<(LabelKind, i64), BTreeSet<i64>>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn labels_of(&mut self, kind: LabelKind) -> &mut BTreeMap<i64, Label> {
        self.labels.entry(kind).or_default()
    }

    fn find_or_create(&mut self, owner: Uuid, kind: LabelKind, name: &str) -> (Label, bool) {
        if let Some(found) = self
            .labels_of(kind)
            .values()
            .find(|l| l.user_id == owner && l.name == name)
        {
            return (found.clone(), false);
        }
        let label = Label {
            id: self.next_id(),
            user_id: owner,
            name: name.to_string(),
        };
        self.labels_of(kind).insert(label.id, label.clone());
        (label, true)
    }

    fn reconcile_labels(&mut self, owner: Uuid, recipe_id: i64, kind: LabelKind, names: &[String]) {
        for name in names {
            let (label, _) = self.find_or_create(owner, kind, name);
            self.attached
                .entry((kind, recipe_id))
                .or_default()
                .insert(label.id);
        }
    }

    fn recipe(&self, owner: Uuid, id: i64) -> Option<Recipe> {
        let row = self.recipes.get(&id).filter(|r| r.user_id == owner)?;
        let labels = |kind: LabelKind| {
            let mut out: Vec<Label> = self
                .attached
                .get(&(kind, id))
                .into_iter()
                .flatten()
                .filter_map(|lid| self.labels.get(&kind).and_then(|m| m.get(lid)).cloned())
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out
        };
        Some(
            row.clone()
                .with_labels(labels(LabelKind::Tag), labels(LabelKind::Ingredient)),
        )
    }

    fn remove_recipe(&mut self, id: i64) {
        self.recipes.remove(&id);
        for kind in LabelKind::ALL {
            self.attached.remove(&(kind, id));
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_account(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut t = self.tables.lock().await;
        if t.accounts.values().any(|a| a.email == new.email) {
            return Err(StoreError::conflict(
                "email",
                "user with this email already exists.",
            ));
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            is_active: true,
            is_staff: new.is_staff,
            is_superuser: new.is_superuser,
            created_at: OffsetDateTime::now_utc(),
        };
        t.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn update_account(
        &self,
        id: Uuid,
        patch: AccountPatch,
    ) -> Result<Option<Account>, StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(email) = &patch.email {
            if t.accounts.values().any(|a| a.id != id && &a.email == email) {
                return Err(StoreError::conflict(
                    "email",
                    "user with this email already exists.",
                ));
            }
        }
        let Some(account) = t.accounts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = patch.email {
            account.email = email;
        }
        if let Some(name) = patch.name {
            account.name = name;
        }
        if let Some(hash) = patch.password_hash {
            account.password_hash = hash;
        }
        Ok(Some(account.clone()))
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let owned: Vec<i64> = t
            .recipes
            .values()
            .filter(|r| r.user_id == id)
            .map(|r| r.id)
            .collect();
        for recipe_id in owned {
            t.remove_recipe(recipe_id);
        }
        for kind in LabelKind::ALL {
            t.labels_of(kind).retain(|_, l| l.user_id != id);
        }
        Ok(t.accounts.remove(&id).is_some())
    }

    async fn list_recipes(&self, owner: Uuid, page: Page) -> Result<Vec<Recipe>, StoreError> {
        let t = self.tables.lock().await;
        let ids = t
            .recipes
            .values()
            .rev()
            .filter(|r| r.user_id == owner)
            .map(|r| r.id);
        Ok(paginate(ids, page)
            .into_iter()
            .filter_map(|id| t.recipe(owner, id))
            .collect())
    }

    async fn get_recipe(&self, owner: Uuid, id: i64) -> Result<Option<Recipe>, StoreError> {
        Ok(self.tables.lock().await.recipe(owner, id))
    }

    async fn create_recipe(&self, owner: Uuid, draft: RecipeDraft) -> Result<Recipe, StoreError> {
        let mut t = self.tables.lock().await;
        let id = t.next_id();
        t.recipes.insert(
            id,
            RecipeRow {
                id,
                user_id: owner,
                title: draft.title.clone(),
                description: draft.description.clone(),
                time_minutes: draft.time_minutes,
                price: draft.price,
                link: draft.link.clone(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        for kind in LabelKind::ALL {
            t.reconcile_labels(owner, id, kind, draft.names(kind));
        }
        t.recipe(owner, id)
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("recipe {id} missing after insert")))
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: i64,
        patch: RecipePatch,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut t = self.tables.lock().await;
        let Some(row) = t.recipes.get_mut(&id).filter(|r| r.user_id == owner) else {
            return Ok(None);
        };
        if let Some(title) = &patch.title {
            row.title = title.clone();
        }
        if let Some(minutes) = patch.time_minutes {
            row.time_minutes = minutes;
        }
        if let Some(price) = patch.price {
            row.price = price;
        }
        if let Some(link) = &patch.link {
            row.link = link.clone();
        }
        if let Some(description) = &patch.description {
            row.description = description.clone();
        }
        for kind in LabelKind::ALL {
            if let LabelChange::Replace(names) = patch.change(kind) {
                t.attached.remove(&(kind, id));
                t.reconcile_labels(owner, id, kind, names);
            }
        }
        Ok(t.recipe(owner, id))
    }

    async fn delete_recipe(&self, owner: Uuid, id: i64) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        if t.recipes.get(&id).is_some_and(|r| r.user_id == owner) {
            t.remove_recipe(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_labels(
        &self,
        owner: Uuid,
        kind: LabelKind,
        page: Page,
    ) -> Result<Vec<Label>, StoreError> {
        let mut t = self.tables.lock().await;
        let mut owned: Vec<Label> = t
            .labels_of(kind)
            .values()
            .filter(|l| l.user_id == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(paginate(owned.into_iter(), page))
    }

    async fn get_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
    ) -> Result<Option<Label>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.labels_of(kind)
            .get(&id)
            .filter(|l| l.user_id == owner)
            .cloned())
    }

    async fn find_or_create_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        name: &str,
    ) -> Result<(Label, bool), StoreError> {
        Ok(self.tables.lock().await.find_or_create(owner, kind, name))
    }

    async fn rename_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
        name: &str,
    ) -> Result<Option<Label>, StoreError> {
        let mut t = self.tables.lock().await;
        let labels = t.labels_of(kind);
        if labels
            .values()
            .any(|l| l.user_id == owner && l.id != id && l.name == name)
        {
            return Err(StoreError::conflict(
                "name",
                format!("{} with this name already exists.", kind.noun()),
            ));
        }
        Ok(labels
            .get_mut(&id)
            .filter(|l| l.user_id == owner)
            .map(|l| {
                l.name = name.to_string();
                l.clone()
            }))
    }

    async fn delete_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: i64,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let owned = t.labels_of(kind).get(&id).is_some_and(|l| l.user_id == owner);
        if !owned {
            return Ok(false);
        }
        t.labels_of(kind).remove(&id);
        for ((k, _), ids) in t.attached.iter_mut() {
            if *k == kind {
                ids.remove(&id);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    async fn account(store: &MemoryStore, email: &str) -> Uuid {
        store
            .create_account(NewAccount {
                email: email.into(),
                password_hash: "x".into(),
                name: "Test".into(),
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap()
            .id
    }

    fn draft(tags: &[&str]) -> RecipeDraft {
        RecipeDraft {
            title: "Soup".into(),
            time_minutes: 10,
            price: Decimal::new(500, 2),
            link: String::new(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ingredients: vec![],
        }
    }

    #[tokio::test]
    async fn same_name_under_two_owners_is_two_labels() {
        let store = MemoryStore::new();
        let a = account(&store, "a@example.com").await;
        let b = account(&store, "b@example.com").await;

        let (la, created_a) = store.find_or_create_label(a, LabelKind::Tag, "X").await.unwrap();
        let (lb, created_b) = store.find_or_create_label(b, LabelKind::Tag, "X").await.unwrap();
        assert!(created_a && created_b);
        assert_ne!(la.id, lb.id);

        let (again, created) = store.find_or_create_label(a, LabelKind::Tag, "X").await.unwrap();
        assert!(!created);
        assert_eq!(again.id, la.id);
    }

    #[tokio::test]
    async fn tags_and_ingredients_are_separate_namespaces() {
        let store = MemoryStore::new();
        let a = account(&store, "a@example.com").await;
        store.find_or_create_label(a, LabelKind::Tag, "Salt").await.unwrap();
        let (_, created) = store
            .find_or_create_label(a, LabelKind::Ingredient, "Salt")
            .await
            .unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn other_owner_cannot_see_or_touch_recipe() {
        let store = MemoryStore::new();
        let a = account(&store, "a@example.com").await;
        let b = account(&store, "b@example.com").await;
        let recipe = store.create_recipe(a, draft(&["Thai"])).await.unwrap();

        assert!(store.get_recipe(b, recipe.id).await.unwrap().is_none());
        assert!(store
            .update_recipe(b, recipe.id, RecipePatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_recipe(b, recipe.id).await.unwrap());
        assert!(store.get_recipe(a, recipe.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn deleting_a_label_detaches_it() {
        let store = MemoryStore::new();
        let a = account(&store, "a@example.com").await;
        let recipe = store.create_recipe(a, draft(&["Thai", "Dinner"])).await.unwrap();
        let thai = recipe.tags.iter().find(|t| t.name == "Thai").unwrap().id;

        assert!(store.delete_label(a, LabelKind::Tag, thai).await.unwrap());

        let reloaded = store.get_recipe(a, recipe.id).await.unwrap().unwrap();
        assert_eq!(reloaded.tags.len(), 1);
        assert_eq!(reloaded.tags[0].name, "Dinner");
    }

    #[tokio::test]
    async fn account_delete_cascades() {
        let store = MemoryStore::new();
        let a = account(&store, "a@example.com").await;
        let recipe = store.create_recipe(a, draft(&["Thai"])).await.unwrap();

        assert!(store.delete_account(a).await.unwrap());
        assert!(store.get_recipe(a, recipe.id).await.unwrap().is_none());
        assert!(store
            .list_labels(a, LabelKind::Tag, Page::default())
            .await
            .unwrap()
            .is_empty());
    }
}
