use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::repo_types::{Account, AccountPatch, NewAccount};
use crate::store::StoreError;

const COLUMNS: &str =
    "id, email, password_hash, name, is_active, is_staff, is_superuser, created_at";
const EMAIL_TAKEN: &str = "user with this email already exists.";

impl Account {
    /// Find an account by normalized email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find account by email")?;
        Ok(account)
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find account by id")?;
        Ok(account)
    }

    /// Create a new account with an already hashed password.
    pub async fn create(db: &PgPool, new: &NewAccount) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.is_staff)
        .bind(new.is_superuser)
        .fetch_one(db)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "email", EMAIL_TAKEN))
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        patch: &AccountPatch,
    ) -> Result<Option<Account>, StoreError> {
        sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE users
               SET email         = COALESCE($2, email),
                   name          = COALESCE($3, name),
                   password_hash = COALESCE($4, password_hash)
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.email.as_deref())
        .bind(patch.name.as_deref())
        .bind(patch.password_hash.as_deref())
        .fetch_optional(db)
        .await
        .map_err(|e| StoreError::from_sqlx(e, "email", EMAIL_TAKEN))
    }

    /// Removes the account's recipes and labels, then the account itself.
    /// Runs on the caller's transaction.
    pub async fn delete_cascade(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<bool> {
        for table in ["recipes", "tags", "ingredients"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1"))
                .bind(id)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("delete {table} of account {id}"))?;
        }
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context("delete account")?;
        Ok(res.rows_affected() > 0)
    }
}
