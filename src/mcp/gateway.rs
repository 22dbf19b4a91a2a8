//! JSON-RPC 2.0 dispatch for the MCP endpoint (§4.10).
//!
//! Parsing/shape failures ahead of method dispatch are JSON-RPC error
//! objects (`-32700`/`-32600`); a recognized method that fails at the
//! tool layer is still a 200 JSON-RPC *response*, carrying `isError`
//! inside the result rather than a JSON-RPC error object.

use std::sync::Arc;

use rmcp::model::{Implementation, ServerCapabilities};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collaborators::{McpToolRegistry, ToolDescriptor};
use crate::models::{ExternalOrganization, ExternalUser};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

pub fn jsonrpc_response(id: Option<Value>, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn jsonrpc_error(id: Option<Value>, code: i64, message: impl Into<String>) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message.into()}})
}

/// Parses a raw request body into a `JsonRpcRequest`, or a ready-to-send
/// JSON-RPC error envelope when the body isn't valid JSON (`-32700`) or
/// doesn't carry a `method` (`-32600`).
pub fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, Value> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| jsonrpc_error(None, PARSE_ERROR, "Parse error"))?;
    let id = value.get("id").cloned();

    if value.get("method").is_none() {
        return Err(jsonrpc_error(id, INVALID_REQUEST, "Invalid Request"));
    }

    serde_json::from_value(value).map_err(|_| jsonrpc_error(id, INVALID_REQUEST, "Invalid Request"))
}

pub struct McpGateway {
    registry: Arc<dyn McpToolRegistry>,
    server_name: String,
}

impl McpGateway {
    pub fn new(registry: Arc<dyn McpToolRegistry>, server_name: impl Into<String>) -> Self {
        Self {
            registry,
            server_name: server_name.into(),
        }
    }

    /// The payload returned by `initialize` and by the bare `GET /api/mcp`.
    pub fn server_info_payload(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": Implementation {
                name: self.server_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                website_url: None,
                icons: None,
            },
            "capabilities": ServerCapabilities::builder().enable_tools().build(),
        })
    }

    /// Backs `GET /api/mcp/tools`, a plain REST view of the registry that
    /// bypasses the JSON-RPC envelope entirely.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list_tools().await
    }

    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        user: &ExternalUser,
        organization: &ExternalOrganization,
    ) -> Value {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => jsonrpc_response(id, self.server_info_payload()),
            "tools/list" => {
                let tools = self.registry.list_tools().await;
                jsonrpc_response(id, json!({"tools": tools}))
            }
            "tools/call" => {
                self.dispatch_tools_call(id, request.params, user, organization).await
            }
            other => jsonrpc_error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
        }
    }

    async fn dispatch_tools_call(
        &self,
        id: Option<Value>,
        params: Option<Value>,
        user: &ExternalUser,
        organization: &ExternalOrganization,
    ) -> Value {
        let Some(params) = params else {
            return jsonrpc_error(id, INVALID_PARAMS, "Missing params");
        };
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return jsonrpc_error(id, INVALID_PARAMS, "Missing params.name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let Some(tool) = self.registry.get_tool(name).await else {
            return jsonrpc_error(id, INVALID_PARAMS, format!("Unknown tool: {name}"));
        };

        match tool.execute(arguments, user, organization).await {
            Ok(value) => jsonrpc_response(
                id,
                json!({"content": [{"type": "text", "text": value.to_string()}], "isError": false}),
            ),
            Err(message) => jsonrpc_response(
                id,
                json!({"content": [{"type": "text", "text": message}], "isError": true}),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{McpTool, ToolDescriptor};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl McpTool for EchoTool {
        async fn execute(
            &self,
            arguments: Value,
            _user: &ExternalUser,
            _organization: &ExternalOrganization,
        ) -> Result<Value, String> {
            if arguments.get("fail").and_then(|v| v.as_bool()).unwrap_or(false) {
                Err("tool raised an error".to_string())
            } else {
                Ok(arguments)
            }
        }
    }

    struct FixedRegistry;

    #[async_trait]
    impl McpToolRegistry for FixedRegistry {
        async fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "echo".into(),
                description: "echoes its input".into(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn get_tool(&self, name: &str) -> Option<Arc<dyn McpTool>> {
            (name == "echo").then(|| Arc::new(EchoTool) as Arc<dyn McpTool>)
        }
    }

    fn test_user_org() -> (ExternalUser, ExternalOrganization) {
        (
            ExternalUser {
                id: "user-1".into(),
                email: "a@example.com".into(),
            },
            ExternalOrganization {
                id: "org-1".into(),
                name: "Acme".into(),
                mcp_enabled: true,
            },
        )
    }

    #[test]
    fn unknown_method_before_body_is_parse_error() {
        let err = parse_request(b"not json").unwrap_err();
        assert_eq!(err["error"]["code"], PARSE_ERROR);
    }

    #[test]
    fn missing_method_is_invalid_request() {
        let err = parse_request(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert_eq!(err["error"]["code"], INVALID_REQUEST);
        assert_eq!(err["id"], json!(1));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let gateway = McpGateway::new(Arc::new(FixedRegistry), "test-gateway");
        let (user, org) = test_user_org();
        let request = parse_request(br#"{"jsonrpc":"2.0","id":1,"method":"bogus"}"#).unwrap();
        let response = gateway.dispatch(request, &user, &org).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tool_raised_failure_is_a_successful_response_with_is_error() {
        let gateway = McpGateway::new(Arc::new(FixedRegistry), "test-gateway");
        let (user, org) = test_user_org();
        let request = parse_request(
            br#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"fail":true}}}"#,
        )
        .unwrap();
        let response = gateway.dispatch(request, &user, &org).await;
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], json!(true));
    }

    #[tokio::test]
    async fn tools_list_returns_registry_contents() {
        let gateway = McpGateway::new(Arc::new(FixedRegistry), "test-gateway");
        let (user, org) = test_user_org();
        let request = parse_request(br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        let response = gateway.dispatch(request, &user, &org).await;
        assert_eq!(response["result"]["tools"][0]["name"], json!("echo"));
    }
}
