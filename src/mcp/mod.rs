//! JSON-RPC 2.0 Model-Context-Protocol gateway (§4.10).
//!
//! This core only speaks the request/response half of MCP over plain
//! HTTP POST; the tool catalog and tool business logic are injected via
//! [`crate::collaborators::McpToolRegistry`] rather than owned here.

pub mod gateway;

pub use gateway::{parse_request, JsonRpcRequest, McpGateway, PROTOCOL_VERSION};
