//! OAuth 2.1 authorization server + MCP JSON-RPC gateway core.
//!
//! The user/organization domain store, the session-cookie login system,
//! and the MCP tool registry are external collaborators (see
//! [`collaborators`]); this crate owns client registration, the
//! authorization-code and token lifecycle, the multi-scheme auth
//! dispatcher, discovery metadata, and JSON-RPC dispatch.

pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod http_util;
pub mod mcp;
pub mod models;
pub mod repositories;
pub mod services;

pub mod test_utils;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::mcp::gateway::McpGateway;
use crate::services::{AuthDispatcher, OAuthService};

/// Shared application state injected into every handler via
/// `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth_dispatcher: Arc<AuthDispatcher>,
    pub oauth_service: Arc<OAuthService>,
    pub mcp_gateway: Arc<McpGateway>,
    pub pool: SqlitePool,
}
