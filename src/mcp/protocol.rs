//! MCP protocol types and message definitions.
//!
//! Based on the Model Context Protocol specification, restricted to the
//! tool surface this server exposes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ErrorRecord;
use crate::fetch::FetchResult;

/// JSON-RPC version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version.
pub const MCP_VERSION: &str = "2024-11-05";

// ===== JSON-RPC Base Types =====

/// A JSON-RPC request. The `id` is opaque and may be `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC response carrying exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: ErrorRecord) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ===== MCP-Specific Types =====

/// Server capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
}

/// Tools capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Logging capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// Server info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Initialize result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// Tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Content block in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// List tools result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

/// Call tool params. Both members are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: HashMap<String, Value>,
}

/// Call tool result: the fetch record plus an MCP text rendering of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(flatten)]
    pub fetch: FetchResult,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn new(fetch: FetchResult) -> Self {
        let text = serde_json::to_string_pretty(&fetch).unwrap_or_default();
        Self {
            fetch,
            content: vec![ContentBlock::Text { text }],
            is_error: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::fetch::FetchBody;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_jsonrpc_request_null_id() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "tools/list"})).unwrap();
        assert_eq!(req.id, Value::Null);
        assert!(req.params.is_none());

        let req: JsonRpcRequest = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": "abc", "method": "tools/list", "params": {}}),
        )
        .unwrap();
        assert_eq!(req.id, json!("abc"));
    }

    #[test]
    fn test_jsonrpc_response_success() {
        let response = JsonRpcResponse::success(json!(1), json!({"success": true}));

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_jsonrpc_response_error_keeps_null_id() {
        let record = ErrorRecord::from_error(&Error::ToolNotFound("x".into()));
        let response = JsonRpcResponse::failure(Value::Null, record);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], Value::Null);
        assert!(json.as_object().unwrap().contains_key("id"));
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["error"]["kind"], "ToolNotFound");
        assert!(response.is_error());
        assert_eq!(response.error.unwrap().kind, ErrorKind::ToolNotFound);
    }

    #[test]
    fn test_tool_definition() {
        let tool = Tool {
            name: "fetch".to_string(),
            description: "Fetch a URL".to_string(),
            input_schema: json!({"type": "object"}),
        };

        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("\"name\":\"fetch\""));
        assert!(json.contains("\"inputSchema\""));
    }

    #[test]
    fn test_initialize_result() {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
                logging: None,
            },
            server_info: ServerInfo {
                name: "mcp-fetch-server".to_string(),
                version: "1.0.0".to_string(),
            },
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["protocolVersion"], MCP_VERSION);
        assert_eq!(json["serverInfo"]["name"], "mcp-fetch-server");
        assert_eq!(json["capabilities"]["tools"]["listChanged"], false);
        assert!(json["capabilities"].get("logging").is_none());
    }

    #[test]
    fn test_call_tool_params_require_arguments() {
        let ok: Result<CallToolParams, _> =
            serde_json::from_value(json!({"name": "fetch", "arguments": {"url": "x"}}));
        assert!(ok.is_ok());

        let missing: Result<CallToolParams, _> = serde_json::from_value(json!({"name": "fetch"}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_call_tool_result_flattens_fetch() {
        let fetch = FetchResult {
            status_code: 200,
            headers: BTreeMap::new(),
            body: FetchBody::Text("ok".to_string()),
            raw_body: None,
            final_url: "http://example.test/".to_string(),
            method: "GET".to_string(),
            size_bytes: 2,
        };

        let json = serde_json::to_value(CallToolResult::new(fetch)).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"], "ok");
        assert_eq!(json["isError"], false);
        assert_eq!(json["content"][0]["type"], "text");
        assert!(json["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"statusCode\": 200"));
    }
}
