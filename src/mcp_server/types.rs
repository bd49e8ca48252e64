//! Shared types for the MCP server.
//!
//! JSON-RPC 2.0 envelopes, the classified inbound [`ProtocolMessage`], and the
//! MCP tool structures exchanged over it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// Correlation id of a request. Numbers and strings are both legal.
///
/// Numbers are kept as parsed, so fractional and out-of-`i64` ids echo back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(serde_json::Number),
    String(String),
}

/// Inbound JSON-RPC message (request or notification).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response message (success or error).
///
/// `id` serializes as `null` when the request's id could not be determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<JsonRpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.data = Some(serde_json::json!({ "detail": detail.into() }));
        self
    }
}

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Protocol messages ──────────────────────────────────────────────────────

/// An inbound message classified by method.
#[derive(Debug, Clone)]
pub enum ProtocolMessage {
    Initialize {
        id: Option<JsonRpcId>,
        params: Option<Value>,
    },
    Ping {
        id: Option<JsonRpcId>,
    },
    ListOperations {
        id: Option<JsonRpcId>,
    },
    CallOperation {
        id: Option<JsonRpcId>,
        params: Option<Value>,
    },
    /// Fire-and-forget; never answered.
    Notification {
        method: String,
    },
    Unknown {
        id: Option<JsonRpcId>,
        method: String,
    },
}

impl ProtocolMessage {
    pub fn from_request(req: JsonRpcRequest) -> Self {
        let JsonRpcRequest {
            id, method, params, ..
        } = req;
        match method.as_str() {
            "initialize" => ProtocolMessage::Initialize { id, params },
            "ping" => ProtocolMessage::Ping { id },
            "tools/list" => ProtocolMessage::ListOperations { id },
            "tools/call" => ProtocolMessage::CallOperation { id, params },
            m if m.starts_with("notifications/") => ProtocolMessage::Notification { method },
            _ => ProtocolMessage::Unknown { id, method },
        }
    }

    /// Correlation id, if the message carries one.
    pub fn id(&self) -> Option<&JsonRpcId> {
        match self {
            ProtocolMessage::Initialize { id, .. }
            | ProtocolMessage::Ping { id }
            | ProtocolMessage::ListOperations { id }
            | ProtocolMessage::CallOperation { id, .. }
            | ProtocolMessage::Unknown { id, .. } => id.as_ref(),
            ProtocolMessage::Notification { .. } => None,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            ProtocolMessage::Initialize { .. } => "initialize",
            ProtocolMessage::Ping { .. } => "ping",
            ProtocolMessage::ListOperations { .. } => "tools/list",
            ProtocolMessage::CallOperation { .. } => "tools/call",
            ProtocolMessage::Notification { method } | ProtocolMessage::Unknown { method, .. } => {
                method.as_str()
            }
        }
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// Result envelope of every tool invocation, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: Some(true),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(raw: Value) -> JsonRpcRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_classify_methods() {
        let msg = ProtocolMessage::from_request(request(
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "x"}}),
        ));
        assert!(matches!(msg, ProtocolMessage::CallOperation { .. }));
        assert_eq!(msg.id(), Some(&JsonRpcId::Number(1.into())));

        let msg = ProtocolMessage::from_request(request(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ));
        assert!(matches!(msg, ProtocolMessage::Notification { .. }));
        assert!(msg.id().is_none());

        let msg = ProtocolMessage::from_request(request(
            json!({"jsonrpc": "2.0", "id": "abc", "method": "resources/list"}),
        ));
        assert_eq!(msg.method(), "resources/list");
        assert_eq!(msg.id(), Some(&JsonRpcId::String("abc".into())));
    }

    #[test]
    fn test_response_null_id_serialized() {
        let resp = JsonRpcResponse::err(None, JsonRpcError::new(error_codes::PARSE_ERROR, "parse error"));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["id"], Value::Null);
        assert_eq!(v["error"]["code"], -32700);
        assert!(v.get("result").is_none());
    }

    #[test]
    fn test_tool_result_envelope_shape() {
        let ok = serde_json::to_value(CallToolResult::text("done")).unwrap();
        assert_eq!(ok, json!({"content": [{"type": "text", "text": "done"}]}));

        let err = serde_json::to_value(CallToolResult::error("boom")).unwrap();
        assert_eq!(err["isError"], true);
        assert_eq!(err["content"][0]["type"], "text");
    }

    #[test]
    fn test_tool_definition_uses_input_schema_key() {
        let def = ToolDefinition {
            name: "get_object".into(),
            description: "Fetch".into(),
            input_schema: json!({"type": "object"}),
        };
        let v = serde_json::to_value(def).unwrap();
        assert!(v.get("inputSchema").is_some());
    }
}
