use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::models::OAuthClient;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("client already exists")]
    AlreadyExists,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence for registered OAuth clients. Every read filters
/// `deleted_at IS NULL`; mutation to `deleted_at` itself uses an atomic
/// `UPDATE ... WHERE deleted_at IS NULL RETURNING` so concurrent
/// delete/rotate races resolve to exactly one winner.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ClientRepository: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        organization_id: &str,
        client_id: &str,
        client_secret_hash: &str,
        name: &str,
        redirect_uris_json: &str,
        scopes: &str,
    ) -> RepositoryResult<OAuthClient>;

    async fn find_live_by_client_id(&self, client_id: &str) -> RepositoryResult<Option<OAuthClient>>;

    async fn list_live_by_organization(
        &self,
        organization_id: &str,
    ) -> RepositoryResult<Vec<OAuthClient>>;

    async fn find_live_by_id_and_organization(
        &self,
        id: i64,
        organization_id: &str,
    ) -> RepositoryResult<Option<OAuthClient>>;

    /// Soft-deletes the client. Returns `true` iff a live row was tombstoned.
    async fn soft_delete(&self, id: i64, organization_id: &str) -> RepositoryResult<bool>;

    /// Replaces the client secret hash in place. Returns the updated row,
    /// or `None` if no live client matched `id`/`organization_id`.
    async fn rotate_secret(
        &self,
        id: i64,
        organization_id: &str,
        new_secret_hash: &str,
    ) -> RepositoryResult<Option<OAuthClient>>;
}

pub struct SqliteClientRepository {
    pool: SqlitePool,
}

impl SqliteClientRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientRepository for SqliteClientRepository {
    async fn create(
        &self,
        organization_id: &str,
        client_id: &str,
        client_secret_hash: &str,
        name: &str,
        redirect_uris_json: &str,
        scopes: &str,
    ) -> RepositoryResult<OAuthClient> {
        let result = sqlx::query!(
            r#"
            INSERT INTO oauth_clients
                (organization_id, client_id, client_secret_hash, name, redirect_uris, scopes)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            organization_id,
            client_id,
            client_secret_hash,
            name,
            redirect_uris_json,
            scopes,
        )
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(e) if e.to_string().contains("UNIQUE") => return Err(RepositoryError::AlreadyExists),
            Err(e) => return Err(RepositoryError::Database(e)),
        };

        self.find_by_row_id(result.last_insert_rowid()).await
    }

    async fn find_live_by_client_id(&self, client_id: &str) -> RepositoryResult<Option<OAuthClient>> {
        let row = sqlx::query_as!(
            OAuthClient,
            r#"
            SELECT id, organization_id, client_id, client_secret_hash, name,
                   redirect_uris, scopes, created_at, updated_at, deleted_at
            FROM oauth_clients
            WHERE client_id = ? AND deleted_at IS NULL
            "#,
            client_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_live_by_organization(
        &self,
        organization_id: &str,
    ) -> RepositoryResult<Vec<OAuthClient>> {
        let rows = sqlx::query_as!(
            OAuthClient,
            r#"
            SELECT id, organization_id, client_id, client_secret_hash, name,
                   redirect_uris, scopes, created_at, updated_at, deleted_at
            FROM oauth_clients
            WHERE organization_id = ? AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
            organization_id
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_live_by_id_and_organization(
        &self,
        id: i64,
        organization_id: &str,
    ) -> RepositoryResult<Option<OAuthClient>> {
        let row = sqlx::query_as!(
            OAuthClient,
            r#"
            SELECT id, organization_id, client_id, client_secret_hash, name,
                   redirect_uris, scopes, created_at, updated_at, deleted_at
            FROM oauth_clients
            WHERE id = ? AND organization_id = ? AND deleted_at IS NULL
            "#,
            id,
            organization_id
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn soft_delete(&self, id: i64, organization_id: &str) -> RepositoryResult<bool> {
        let result = sqlx::query!(
            r#"
            UPDATE oauth_clients
            SET deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ? AND organization_id = ? AND deleted_at IS NULL
            "#,
            id,
            organization_id
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate_secret(
        &self,
        id: i64,
        organization_id: &str,
        new_secret_hash: &str,
    ) -> RepositoryResult<Option<OAuthClient>> {
        let result = sqlx::query!(
            r#"
            UPDATE oauth_clients
            SET client_secret_hash = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ? AND organization_id = ? AND deleted_at IS NULL
            "#,
            new_secret_hash,
            id,
            organization_id
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_live_by_id_and_organization(id, organization_id)
            .await
    }
}

impl SqliteClientRepository {
    async fn find_by_row_id(&self, id: i64) -> RepositoryResult<OAuthClient> {
        let row = sqlx::query_as!(
            OAuthClient,
            r#"
            SELECT id, organization_id, client_id, client_secret_hash, name,
                   redirect_uris, scopes, created_at, updated_at, deleted_at
            FROM oauth_clients
            WHERE id = ?
            "#,
            id
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
