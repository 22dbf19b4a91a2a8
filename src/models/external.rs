//! Stand-ins for the external user/organization domain store.
//!
//! The real application owns a much richer `User`/`Organization` model
//! (profile data, billing, membership). This core only ever needs the
//! id, and for the organization, whether MCP is enabled — so that's all
//! that's modeled here. A production deployment wires [`crate::collaborators`]
//! traits against the real domain store instead of the Sqlite-backed
//! stand-ins in this crate.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExternalUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExternalOrganization {
    pub id: String,
    pub name: String,
    pub mcp_enabled: bool,
}
