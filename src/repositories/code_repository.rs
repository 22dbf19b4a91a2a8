use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::AuthorizationCode;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence for single-use authorization codes.
///
/// `tombstone` is the atomicity boundary required by the concurrency
/// model: it's a single `UPDATE ... WHERE deleted_at IS NULL` so that if
/// two exchange requests race on the same code, exactly one affects a
/// row. Callers must treat "0 rows affected" as `invalid_grant`, not as
/// an internal error.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait AuthorizationCodeRepository: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        code: &str,
        client_id: &str,
        user_id: &str,
        organization_id: &str,
        redirect_uri: &str,
        scope: &str,
        code_challenge: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<AuthorizationCode>;

    async fn find_live_by_code_and_client(
        &self,
        code: &str,
        client_id: &str,
    ) -> RepositoryResult<Option<AuthorizationCode>>;

    /// Atomically tombstones the code. Returns `true` iff this call won
    /// the race (a live row existed and was consumed by it).
    async fn tombstone(&self, code: &str) -> RepositoryResult<bool>;
}

pub struct SqliteAuthorizationCodeRepository {
    pool: SqlitePool,
}

impl SqliteAuthorizationCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorizationCodeRepository for SqliteAuthorizationCodeRepository {
    async fn create(
        &self,
        code: &str,
        client_id: &str,
        user_id: &str,
        organization_id: &str,
        redirect_uri: &str,
        scope: &str,
        code_challenge: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<AuthorizationCode> {
        let result = sqlx::query!(
            r#"
            INSERT INTO oauth_authorization_codes
                (code, client_id, user_id, organization_id, redirect_uri, scope, code_challenge, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            code,
            client_id,
            user_id,
            organization_id,
            redirect_uri,
            scope,
            code_challenge,
            expires_at,
        )
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as!(
            AuthorizationCode,
            r#"
            SELECT id, code, client_id, user_id, organization_id, redirect_uri, scope,
                   code_challenge, expires_at as "expires_at: DateTime<Utc>", created_at, deleted_at
            FROM oauth_authorization_codes
            WHERE id = ?
            "#,
            result.last_insert_rowid()
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_live_by_code_and_client(
        &self,
        code: &str,
        client_id: &str,
    ) -> RepositoryResult<Option<AuthorizationCode>> {
        let row = sqlx::query_as!(
            AuthorizationCode,
            r#"
            SELECT id, code, client_id, user_id, organization_id, redirect_uri, scope,
                   code_challenge, expires_at as "expires_at: DateTime<Utc>", created_at, deleted_at
            FROM oauth_authorization_codes
            WHERE code = ? AND client_id = ? AND deleted_at IS NULL
            "#,
            code,
            client_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn tombstone(&self, code: &str) -> RepositoryResult<bool> {
        let result = sqlx::query!(
            r#"
            UPDATE oauth_authorization_codes
            SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE code = ? AND deleted_at IS NULL
            "#,
            code
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
