use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::{User, UserDb};
use crate::error::{Result, UserError};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Postgres-backed user store.
#[derive(Clone)]
pub struct PgUserDb {
    pool: PgPool,
}

impl PgUserDb {
    pub async fn open(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")
            .map_err(UserError::Store)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDb for PgUserDb {
    /// Find a user by id.
    async fn by_id(&self, id: i64) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, remember_digest, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// Find a user by an already normalized email.
    async fn by_email(&self, email: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, remember_digest, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// Find a user by remember digest; the token must already be hashed.
    async fn by_remember(&self, digest: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, remember_digest, created_at, updated_at
            FROM users
            WHERE remember_digest = $1
            "#,
        )
        .bind(digest)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(skip_all)]
    async fn create(&self, user: &mut User) -> Result<()> {
        let (id, created_at, updated_at) = sqlx::query_as::<_, (i64, OffsetDateTime, OffsetDateTime)>(
            r#"
            INSERT INTO users (name, email, password_hash, remember_digest)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.remember_digest)
        .fetch_one(&self.pool)
        .await?;

        user.id = id;
        user.created_at = Some(created_at);
        user.updated_at = Some(updated_at);
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = user.id))]
    async fn update(&self, user: &mut User) -> Result<()> {
        let (created_at, updated_at) = sqlx::query_as::<_, (OffsetDateTime, OffsetDateTime)>(
            r#"
            UPDATE users
               SET name = $2,
                   email = $3,
                   password_hash = $4,
                   remember_digest = $5,
                   updated_at = now()
             WHERE id = $1
            RETURNING created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.remember_digest)
        .fetch_one(&self.pool)
        .await?;

        user.created_at = Some(created_at);
        user.updated_at = Some(updated_at);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<()> {
        let done = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("run users migrations")
            .map_err(UserError::Store)?;
        info!("users schema up to date");
        Ok(())
    }

    async fn reset_schema(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS users").execute(&self.pool).await?;
        // forget applied versions so the migrator recreates the table
        sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
            .execute(&self.pool)
            .await?;
        info!("users table dropped");
        self.ensure_schema().await
    }
}
