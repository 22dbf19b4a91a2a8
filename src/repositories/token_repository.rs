use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::AccessTokenRecord;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence for combined access/refresh token records. A single row
/// carries both the access token hash and the paired refresh token hash
/// (when one was minted); rotation tombstones the whole row atomically,
/// invalidating access and refresh together.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait AccessTokenRepository: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        token_hash: &str,
        client_id: &str,
        user_id: &str,
        organization_id: &str,
        scope: &str,
        expires_at: DateTime<Utc>,
        refresh_token_hash: Option<&str>,
        refresh_expires_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<AccessTokenRecord>;

    async fn find_live_by_token_hash(
        &self,
        token_hash: &str,
    ) -> RepositoryResult<Option<AccessTokenRecord>>;

    async fn find_live_by_refresh_hash_and_client(
        &self,
        refresh_token_hash: &str,
        client_id: &str,
    ) -> RepositoryResult<Option<AccessTokenRecord>>;

    /// Atomically tombstones the record by id. Returns `true` iff this
    /// call won the race.
    async fn tombstone(&self, id: i64) -> RepositoryResult<bool>;
}

pub struct SqliteAccessTokenRepository {
    pool: SqlitePool,
}

impl SqliteAccessTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessTokenRepository for SqliteAccessTokenRepository {
    async fn create(
        &self,
        token_hash: &str,
        client_id: &str,
        user_id: &str,
        organization_id: &str,
        scope: &str,
        expires_at: DateTime<Utc>,
        refresh_token_hash: Option<&str>,
        refresh_expires_at: Option<DateTime<Utc>>,
    ) -> RepositoryResult<AccessTokenRecord> {
        let result = sqlx::query!(
            r#"
            INSERT INTO oauth_access_tokens
                (token_hash, client_id, user_id, organization_id, scope, expires_at,
                 refresh_token_hash, refresh_expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            token_hash,
            client_id,
            user_id,
            organization_id,
            scope,
            expires_at,
            refresh_token_hash,
            refresh_expires_at,
        )
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as!(
            AccessTokenRecord,
            r#"
            SELECT id, token_hash, client_id, user_id, organization_id, scope,
                   expires_at as "expires_at: DateTime<Utc>", refresh_token_hash,
                   refresh_expires_at as "refresh_expires_at: DateTime<Utc>", created_at, deleted_at
            FROM oauth_access_tokens
            WHERE id = ?
            "#,
            result.last_insert_rowid()
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_live_by_token_hash(
        &self,
        token_hash: &str,
    ) -> RepositoryResult<Option<AccessTokenRecord>> {
        let row = sqlx::query_as!(
            AccessTokenRecord,
            r#"
            SELECT id, token_hash, client_id, user_id, organization_id, scope,
                   expires_at as "expires_at: DateTime<Utc>", refresh_token_hash,
                   refresh_expires_at as "refresh_expires_at: DateTime<Utc>", created_at, deleted_at
            FROM oauth_access_tokens
            WHERE token_hash = ? AND deleted_at IS NULL
            "#,
            token_hash
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_live_by_refresh_hash_and_client(
        &self,
        refresh_token_hash: &str,
        client_id: &str,
    ) -> RepositoryResult<Option<AccessTokenRecord>> {
        let row = sqlx::query_as!(
            AccessTokenRecord,
            r#"
            SELECT id, token_hash, client_id, user_id, organization_id, scope,
                   expires_at as "expires_at: DateTime<Utc>", refresh_token_hash,
                   refresh_expires_at as "refresh_expires_at: DateTime<Utc>", created_at, deleted_at
            FROM oauth_access_tokens
            WHERE refresh_token_hash = ? AND client_id = ? AND deleted_at IS NULL
            "#,
            refresh_token_hash,
            client_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn tombstone(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query!(
            r#"
            UPDATE oauth_access_tokens
            SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ? AND deleted_at IS NULL
            "#,
            id
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
