use std::collections::HashMap;

use anyhow::Context;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    labels::{self, repo_types::LabelKind},
    recipes::{
        reconcile::{RecipeDraft, RecipePatch},
        repo_types::{Recipe, RecipeRow},
    },
    store::Page,
};

const COLUMNS: &str = "id, user_id, title, description, time_minutes, price, link, created_at";

/// Attaches tags and ingredients to freshly loaded rows, keeping row order.
async fn with_labels(conn: &mut PgConnection, rows: Vec<RecipeRow>) -> anyhow::Result<Vec<Recipe>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut by_kind = HashMap::new();
    for kind in LabelKind::ALL {
        let mut grouped: HashMap<i64, Vec<_>> = HashMap::new();
        for (recipe_id, label) in labels::repo::for_recipes(&mut *conn, kind, &ids).await? {
            grouped.entry(recipe_id).or_default().push(label);
        }
        by_kind.insert(kind, grouped);
    }
    let mut take = |kind: LabelKind, id: i64| {
        by_kind
            .get_mut(&kind)
            .and_then(|g| g.remove(&id))
            .unwrap_or_default()
    };
    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = take(LabelKind::Tag, row.id);
            let ingredients = take(LabelKind::Ingredient, row.id);
            row.with_labels(tags, ingredients)
        })
        .collect())
}

pub async fn list_by_user(
    conn: &mut PgConnection,
    owner: Uuid,
    page: Page,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, RecipeRow>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM recipes
         WHERE user_id = $1
         ORDER BY id DESC
         LIMIT $2 OFFSET $3
        "#
    ))
    .bind(owner)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&mut *conn)
    .await
    .context("list recipes")?;
    with_labels(conn, rows).await
}

pub async fn get(conn: &mut PgConnection, owner: Uuid, id: i64) -> anyhow::Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, RecipeRow>(&format!(
        "SELECT {COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(owner)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("get recipe {id}"))?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(with_labels(conn, vec![row]).await?.pop())
}

/// Inserts the bare recipe row; labels are reconciled afterwards.
pub async fn insert(
    conn: &mut PgConnection,
    owner: Uuid,
    draft: &RecipeDraft,
) -> anyhow::Result<RecipeRow> {
    let row = sqlx::query_as::<_, RecipeRow>(&format!(
        r#"
        INSERT INTO recipes (user_id, title, description, time_minutes, price, link)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(owner)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.time_minutes)
    .bind(draft.price)
    .bind(&draft.link)
    .fetch_one(conn)
    .await
    .context("insert recipe")?;
    Ok(row)
}

/// Locks the owner's recipe row for the rest of the transaction.
pub async fn lock(conn: &mut PgConnection, owner: Uuid, id: i64) -> anyhow::Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM recipes WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(owner)
            .fetch_optional(conn)
            .await
            .with_context(|| format!("lock recipe {id}"))?;
    Ok(row.is_some())
}

/// Overwrites the scalar columns present in the patch. The owner never changes.
pub async fn update_scalars(
    conn: &mut PgConnection,
    owner: Uuid,
    id: i64,
    patch: &RecipePatch,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE recipes
           SET title        = COALESCE($3, title),
               time_minutes = COALESCE($4, time_minutes),
               price        = COALESCE($5, price),
               link         = COALESCE($6, link),
               description  = COALESCE($7, description)
         WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(owner)
    .bind(patch.title.as_deref())
    .bind(patch.time_minutes)
    .bind(patch.price)
    .bind(patch.link.as_deref())
    .bind(patch.description.as_deref())
    .execute(conn)
    .await
    .with_context(|| format!("update recipe {id}"))?;
    Ok(())
}

pub async fn delete(conn: &mut PgConnection, owner: Uuid, id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(owner)
        .execute(conn)
        .await
        .with_context(|| format!("delete recipe {id}"))?;
    Ok(res.rows_affected() > 0)
}
