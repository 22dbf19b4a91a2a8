//! Interfaces this core consumes from systems that are explicitly out of
//! scope: the user/organization domain store, the session-cookie login
//! system, the API-key service, and the MCP tool registry. None of
//! these are redesigned here — this module only names the shape the
//! core needs, following the same `#[async_trait] trait X: Send + Sync`
//! + `#[cfg_attr(test, mockall::automock)]` shape the rest of the
//! application uses for its repositories.
//!
//! The Sqlite-backed implementations below are stand-ins suitable for a
//! standalone deployment and for integration tests; a real deployment
//! wires these traits against the actual domain store instead.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{ExternalOrganization, ExternalUser};

/// `bow_<key>` API keys, resolved to the owning user and organization.
/// Mirrors `ApiKeyService.get_user_by_api_key` / `.get_organization_by_api_key`.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ApiKeyService: Send + Sync {
    async fn get_user_by_api_key(&self, api_key: &str) -> Option<ExternalUser>;
    async fn get_organization_by_api_key(&self, api_key: &str) -> Option<ExternalOrganization>;
}

/// Resolves a first-party session token to the user it belongs to.
/// Opaque to this core: it neither mints nor validates the token format,
/// it just asks the session-cookie system whether the token is live.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SessionResolver: Send + Sync {
    async fn resolve_user(&self, session_token: &str) -> Option<ExternalUser>;
}

/// Determines the active organization for an already-resolved user.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait OrganizationSelector: Send + Sync {
    async fn select_for_user(&self, user: &ExternalUser) -> Option<ExternalOrganization>;
}

/// Per-organization feature gating. Backs the `mcp_enabled` check that
/// must pass before any MCP request is dispatched.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait FeatureFlagReader: Send + Sync {
    async fn mcp_enabled(&self, organization: &ExternalOrganization) -> bool;
}

/// Loads a user or organization by id. Backs bearer-token validation
/// (§4.5), which must resolve both before returning a credential as
/// valid.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait DomainLookup: Send + Sync {
    async fn get_user(&self, id: &str) -> Option<ExternalUser>;
    async fn get_organization(&self, id: &str) -> Option<ExternalOrganization>;
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A single invocable tool. `execute` returns `Err` for a tool-raised
/// failure, which the gateway wraps as `isError: true` rather than a
/// JSON-RPC error object (§4.10).
#[async_trait]
pub trait McpTool: Send + Sync {
    async fn execute(
        &self,
        arguments: serde_json::Value,
        user: &ExternalUser,
        organization: &ExternalOrganization,
    ) -> Result<serde_json::Value, String>;
}

/// The MCP tool registry, injected rather than owned by this core.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait McpToolRegistry: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolDescriptor>;
    async fn get_tool(&self, name: &str) -> Option<Arc<dyn McpTool>>;
}

/// Sqlite-backed stand-in for the API key, organization-selection, and
/// feature-flag collaborators, reading from the stub `api_keys` /
/// `organizations` tables this crate's own migration carries for tests
/// and standalone deployment.
pub struct SqliteOrganizationStore {
    pool: SqlitePool,
}

impl SqliteOrganizationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyService for SqliteOrganizationStore {
    async fn get_user_by_api_key(&self, api_key: &str) -> Option<ExternalUser> {
        let hash = crate::crypto::hash(api_key);
        sqlx::query_as!(
            ExternalUser,
            r#"
            SELECT users.id, users.email
            FROM users
            JOIN api_keys ON api_keys.user_id = users.id
            WHERE api_keys.key_hash = ? AND api_keys.deleted_at IS NULL
            "#,
            hash
        )
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
    }

    async fn get_organization_by_api_key(&self, api_key: &str) -> Option<ExternalOrganization> {
        let hash = crate::crypto::hash(api_key);
        sqlx::query_as!(
            ExternalOrganization,
            r#"
            SELECT organizations.id, organizations.name,
                   organizations.mcp_enabled as "mcp_enabled: bool"
            FROM organizations
            JOIN api_keys ON api_keys.organization_id = organizations.id
            WHERE api_keys.key_hash = ? AND api_keys.deleted_at IS NULL
            "#,
            hash
        )
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
    }
}

#[async_trait]
impl OrganizationSelector for SqliteOrganizationStore {
    async fn select_for_user(&self, user: &ExternalUser) -> Option<ExternalOrganization> {
        sqlx::query_as!(
            ExternalOrganization,
            r#"
            SELECT organizations.id, organizations.name,
                   organizations.mcp_enabled as "mcp_enabled: bool"
            FROM organizations
            JOIN users ON users.organization_id = organizations.id
            WHERE users.id = ?
            "#,
            user.id
        )
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
    }
}

#[async_trait]
impl FeatureFlagReader for SqliteOrganizationStore {
    async fn mcp_enabled(&self, organization: &ExternalOrganization) -> bool {
        organization.mcp_enabled
    }
}

#[async_trait]
impl DomainLookup for SqliteOrganizationStore {
    async fn get_user(&self, id: &str) -> Option<ExternalUser> {
        sqlx::query_as!(ExternalUser, "SELECT id, email FROM users WHERE id = ?", id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
    }

    async fn get_organization(&self, id: &str) -> Option<ExternalOrganization> {
        sqlx::query_as!(
            ExternalOrganization,
            r#"SELECT id, name, mcp_enabled as "mcp_enabled: bool" FROM organizations WHERE id = ?"#,
            id
        )
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
    }
}

/// Default session resolver for a standalone deployment of this core:
/// the real session-cookie login system is out of scope, so there is
/// nothing to resolve against. A production deployment replaces this
/// with an adapter over the actual session store.
pub struct NoSessionResolver;

#[async_trait]
impl SessionResolver for NoSessionResolver {
    async fn resolve_user(&self, _session_token: &str) -> Option<ExternalUser> {
        None
    }
}

/// `echo` tool used by the standalone registry stand-in below: returns
/// its own `arguments` unless `arguments.fail` is `true`, in which case
/// it raises a tool-level failure to exercise the `isError: true` path.
struct EchoTool;

#[async_trait]
impl McpTool for EchoTool {
    async fn execute(
        &self,
        arguments: serde_json::Value,
        _user: &ExternalUser,
        _organization: &ExternalOrganization,
    ) -> Result<serde_json::Value, String> {
        if arguments.get("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
            Err("echo tool received fail: true".to_string())
        } else {
            Ok(arguments)
        }
    }
}

/// Stand-in for the real MCP tool registry (out of scope, §1): carries a
/// single `echo` tool so a standalone deployment of this core has
/// something for `tools/list`/`tools/call` to exercise. A production
/// deployment wires [`McpToolRegistry`] against the actual tool catalog
/// instead.
pub struct StaticMcpToolRegistry {
    tools: Vec<Arc<dyn McpTool>>,
}

impl Default for StaticMcpToolRegistry {
    fn default() -> Self {
        Self {
            tools: vec![Arc::new(EchoTool)],
        }
    }
}

#[async_trait]
impl McpToolRegistry for StaticMcpToolRegistry {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "echo".to_string(),
            description: "Echoes back its input arguments".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }]
    }

    async fn get_tool(&self, name: &str) -> Option<Arc<dyn McpTool>> {
        if name == "echo" {
            self.tools.first().cloned()
        } else {
            None
        }
    }
}
