use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::labels::repo_types::{Label, LabelKind};
use crate::store::{Page, StoreError};

/// Returns the owner's label with this name, creating it if needed.
///
/// The insert skips on a `(user_id, name)` conflict, waiting for a concurrent
/// inserter to finish first. The follow-up read runs as a new statement, so it
/// sees that row once committed. Reuse only takes a `FOR KEY SHARE` lock, which
/// never conflicts with another reconciler but holds off a concurrent delete.
pub async fn find_or_create(
    conn: &mut PgConnection,
    owner: Uuid,
    kind: LabelKind,
    name: &str,
) -> anyhow::Result<(Label, bool)> {
    let insert = format!(
        r#"
        INSERT INTO {table} (user_id, name)
        VALUES ($1, $2)
        ON CONFLICT (user_id, name) DO NOTHING
        RETURNING id, user_id, name
        "#,
        table = kind.table()
    );
    let inserted = sqlx::query_as::<_, Label>(&insert)
        .bind(owner)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("create {} {name:?}", kind.noun()))?;
    if let Some(label) = inserted {
        return Ok((label, true));
    }

    let select = format!(
        "SELECT id, user_id, name FROM {} WHERE user_id = $1 AND name = $2 FOR KEY SHARE",
        kind.table()
    );
    let existing = sqlx::query_as::<_, Label>(&select)
        .bind(owner)
        .bind(name)
        .fetch_one(conn)
        .await
        .with_context(|| format!("find {} {name:?}", kind.noun()))?;
    Ok((existing, false))
}

/// Attaches a label to a recipe. Re-attaching is a no-op.
pub async fn attach(
    conn: &mut PgConnection,
    owner: Uuid,
    recipe_id: i64,
    kind: LabelKind,
    label_id: i64,
) -> anyhow::Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {join} (recipe_id, label_id, user_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
        join = kind.join_table()
    );
    sqlx::query(&sql)
        .bind(recipe_id)
        .bind(label_id)
        .bind(owner)
        .execute(conn)
        .await
        .with_context(|| format!("attach {} {label_id} to recipe {recipe_id}", kind.noun()))?;
    Ok(())
}

pub async fn detach_all(
    conn: &mut PgConnection,
    recipe_id: i64,
    kind: LabelKind,
) -> anyhow::Result<()> {
    let sql = format!("DELETE FROM {} WHERE recipe_id = $1", kind.join_table());
    sqlx::query(&sql)
        .bind(recipe_id)
        .execute(conn)
        .await
        .with_context(|| format!("clear {}s of recipe {recipe_id}", kind.noun()))?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AttachedLabel {
    recipe_id: i64,
    id: i64,
    user_id: Uuid,
    name: String,
}

/// Labels of several recipes at once, as `(recipe_id, label)` pairs sorted by name.
pub async fn for_recipes(
    conn: &mut PgConnection,
    kind: LabelKind,
    recipe_ids: &[i64],
) -> anyhow::Result<Vec<(i64, Label)>> {
    let sql = format!(
        r#"
        SELECT j.recipe_id, l.id, l.user_id, l.name
          FROM {join} j
          JOIN {table} l ON l.id = j.label_id
         WHERE j.recipe_id = ANY($1)
         ORDER BY l.name ASC
        "#,
        join = kind.join_table(),
        table = kind.table()
    );
    let rows = sqlx::query_as::<_, AttachedLabel>(&sql)
        .bind(recipe_ids)
        .fetch_all(conn)
        .await
        .with_context(|| format!("load {}s for recipes", kind.noun()))?;
    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.recipe_id,
                Label {
                    id: r.id,
                    user_id: r.user_id,
                    name: r.name,
                },
            )
        })
        .collect())
}

pub async fn list_by_user(
    db: &PgPool,
    owner: Uuid,
    kind: LabelKind,
    page: Page,
) -> anyhow::Result<Vec<Label>> {
    let sql = format!(
        r#"
        SELECT id, user_id, name
          FROM {}
         WHERE user_id = $1
         ORDER BY name DESC
         LIMIT $2 OFFSET $3
        "#,
        kind.table()
    );
    let rows = sqlx::query_as::<_, Label>(&sql)
        .bind(owner)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
        .with_context(|| format!("list {}s", kind.noun()))?;
    Ok(rows)
}

pub async fn get(
    db: &PgPool,
    owner: Uuid,
    kind: LabelKind,
    id: i64,
) -> anyhow::Result<Option<Label>> {
    let sql = format!(
        "SELECT id, user_id, name FROM {} WHERE id = $1 AND user_id = $2",
        kind.table()
    );
    let row = sqlx::query_as::<_, Label>(&sql)
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await
        .with_context(|| format!("get {} {id}", kind.noun()))?;
    Ok(row)
}

pub async fn rename(
    db: &PgPool,
    owner: Uuid,
    kind: LabelKind,
    id: i64,
    name: &str,
) -> Result<Option<Label>, StoreError> {
    let sql = format!(
        r#"
        UPDATE {}
           SET name = $3
         WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, name
        "#,
        kind.table()
    );
    sqlx::query_as::<_, Label>(&sql)
        .bind(id)
        .bind(owner)
        .bind(name)
        .fetch_optional(db)
        .await
        .map_err(|e| {
            StoreError::from_sqlx(
                e,
                "name",
                format!("{} with this name already exists.", kind.noun()),
            )
        })
}

/// Deletes a label; its recipe attachments go with it.
pub async fn delete(db: &PgPool, owner: Uuid, kind: LabelKind, id: i64) -> anyhow::Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", kind.table());
    let res = sqlx::query(&sql)
        .bind(id)
        .bind(owner)
        .execute(db)
        .await
        .with_context(|| format!("delete {} {id}", kind.noun()))?;
    Ok(res.rows_affected() > 0)
}
