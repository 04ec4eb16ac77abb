//! User and space repository.
//!
//! Users are created by the auth gateway; the core maintains the invariant
//! that every user owns at least one space with exactly one default.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use spaces_core::{Error, Result, Space, User};

/// PostgreSQL repository for users and their spaces.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user and ensure a default space exists.
    /// Duplicate emails (case-insensitive) surface as `Conflict`.
    pub async fn create(&self, email: &str, pw_hash: &str) -> Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, pw_hash)
            VALUES ($1, $2)
            RETURNING id, email, pw_hash, created_at, last_login_at
            "#,
        )
        .bind(email)
        .bind(pw_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let user = row_to_user(&row);
        self.ensure_default_space(user.id).await?;
        Ok(user)
    }

    /// Case-insensitive email lookup.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, pw_hash, created_at, last_login_at
             FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn get_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, pw_hash, created_at, last_login_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn touch_last_login(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Return the user's default space id, creating "My Space" if none exists.
    pub async fn ensure_default_space(&self, user_id: i64) -> Result<i64> {
        let existing = sqlx::query(
            "SELECT id FROM spaces WHERE user_id = $1 AND is_default = TRUE",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = existing {
            return Ok(row.get("id"));
        }

        let row = sqlx::query(
            "INSERT INTO spaces (user_id, name, is_default) VALUES ($1, 'My Space', TRUE)
             RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.get("id"))
    }

    pub async fn create_space(&self, user_id: i64, name: &str, is_default: bool) -> Result<Space> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            r#"
            INSERT INTO spaces (user_id, name, is_default)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, name, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let space = row_to_space(&row);
        if is_default {
            sqlx::query("UPDATE spaces SET is_default = FALSE WHERE user_id = $1 AND id <> $2")
                .bind(user_id)
                .bind(space.id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(space)
    }

    pub async fn list_spaces(&self, user_id: i64) -> Result<Vec<Space>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, is_default, created_at
             FROM spaces WHERE user_id = $1
             ORDER BY is_default DESC, name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(row_to_space).collect())
    }

    /// Fetch a space, verifying ownership. Another user's space is `Forbidden`.
    pub async fn get_space(&self, user_id: i64, space_id: i64) -> Result<Space> {
        let row = sqlx::query(
            "SELECT id, user_id, name, is_default, created_at FROM spaces WHERE id = $1",
        )
        .bind(space_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("space {space_id}")))?;

        let space = row_to_space(&row);
        if space.user_id != user_id {
            return Err(Error::Forbidden(format!("space {space_id}")));
        }
        Ok(space)
    }

    pub async fn set_default_space(&self, user_id: i64, space_id: i64) -> Result<()> {
        // Ownership check before mutation.
        self.get_space(user_id, space_id).await?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        sqlx::query("UPDATE spaces SET is_default = FALSE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("UPDATE spaces SET is_default = TRUE WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(space_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        pw_hash: row.get("pw_hash"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        last_login_at: row.get("last_login_at"),
    }
}

fn row_to_space(row: &sqlx::postgres::PgRow) -> Space {
    Space {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        is_default: row.get("is_default"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}
