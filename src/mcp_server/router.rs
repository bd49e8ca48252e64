//! Message router — parses inbound JSON-RPC messages and dispatches them.
//!
//! Tool failures of any kind (unknown name, invalid arguments, upstream
//! errors, even handler panics) come back as `isError` tool results. Only
//! envelope problems produce JSON-RPC errors.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tokio::task::JoinError;

use super::catalog::ToolCatalog;
use super::errors::ToolError;
use super::sessions::Session;
use super::types::{
    error_codes, CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcId,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ProtocolMessage, ServerInfo,
};

/// Protocol revisions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Dispatches protocol messages against a [`ToolCatalog`].
pub struct MessageRouter {
    catalog: Arc<dyn ToolCatalog>,
    server_info: ServerInfo,
}

impl MessageRouter {
    pub fn new(catalog: Arc<dyn ToolCatalog>, server_info: ServerInfo) -> Self {
        Self {
            catalog,
            server_info,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn ToolCatalog> {
        &self.catalog
    }

    /// Parse a raw request body into a [`ProtocolMessage`].
    ///
    /// On failure returns the error response to send back: `-32700` for
    /// invalid JSON, `-32600` for batches and malformed envelopes.
    pub fn parse(body: &str) -> Result<ProtocolMessage, JsonRpcResponse> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            JsonRpcResponse::err(
                None,
                JsonRpcError::new(error_codes::PARSE_ERROR, "parse error").with_detail(e.to_string()),
            )
        })?;

        if value.is_array() {
            return Err(JsonRpcResponse::err(
                None,
                JsonRpcError::new(error_codes::INVALID_REQUEST, "batching not supported"),
            ));
        }

        // Recover the id first so envelope errors still correlate.
        let id = value
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value::<JsonRpcId>(v).ok());

        let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
            JsonRpcResponse::err(
                id.clone(),
                JsonRpcError::new(error_codes::INVALID_REQUEST, "invalid request")
                    .with_detail(e.to_string()),
            )
        })?;

        if request.jsonrpc != "2.0" {
            return Err(JsonRpcResponse::err(
                id,
                JsonRpcError::new(error_codes::INVALID_REQUEST, "invalid request")
                    .with_detail(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
            ));
        }

        Ok(ProtocolMessage::from_request(request))
    }

    /// Parse and route a raw body. Parse failures are delivered like any
    /// other response.
    pub async fn handle_raw(&self, body: &str, session: Option<&Session>) -> Option<JsonRpcResponse> {
        match Self::parse(body) {
            Ok(msg) => self.route(msg, session).await,
            Err(resp) => {
                tracing::warn!(
                    code = resp.error.as_ref().map(|e| e.code),
                    "rejected inbound message"
                );
                deliver(session, &resp);
                Some(resp)
            }
        }
    }

    /// Handle one message.
    ///
    /// The response (if any) is written to `session` when one is bound and is
    /// always returned as well. Notifications produce `None`.
    pub async fn route(&self, msg: ProtocolMessage, session: Option<&Session>) -> Option<JsonRpcResponse> {
        let response = self.dispatch(msg).await?;
        deliver(session, &response);
        Some(response)
    }

    async fn dispatch(&self, msg: ProtocolMessage) -> Option<JsonRpcResponse> {
        match msg {
            ProtocolMessage::Initialize { id, params } => {
                let result = self.initialize(params.as_ref());
                Some(to_response(id, &result))
            }
            ProtocolMessage::Ping { id } => Some(JsonRpcResponse::ok(id, json!({}))),
            ProtocolMessage::ListOperations { id } => {
                let result = ListToolsResult {
                    tools: self.catalog.list_tools(),
                };
                Some(to_response(id, &result))
            }
            ProtocolMessage::CallOperation { id, params } => match self.call_operation(params).await {
                Ok(result) => Some(to_response(id, &result)),
                Err(error) => Some(JsonRpcResponse::err(id, error)),
            },
            ProtocolMessage::Notification { method } => {
                tracing::debug!(method = %method, "notification received");
                None
            }
            ProtocolMessage::Unknown { id, method } => {
                tracing::debug!(method = %method, "method not found");
                Some(JsonRpcResponse::err(
                    id,
                    JsonRpcError::new(
                        error_codes::METHOD_NOT_FOUND,
                        format!("method not found: {method}"),
                    ),
                ))
            }
        }
    }

    fn initialize(&self, params: Option<&Value>) -> InitializeResult {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let protocol_version = requested
            .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v))
            .copied()
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

        tracing::info!(
            requested = requested.unwrap_or("<none>"),
            negotiated = protocol_version,
            "initialize"
        );

        InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: self.server_info.clone(),
        }
    }

    async fn call_operation(&self, params: Option<Value>) -> Result<CallToolResult, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::new(error_codes::INVALID_PARAMS, "missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::new(error_codes::INVALID_PARAMS, "invalid params")
                        .with_detail(e.to_string())
                })
            })?;

        let name = params.name;
        if !self.catalog.contains(&name) {
            tracing::warn!(tool = %name, "call for unknown operation");
            return error_result(&ToolError::UnknownTool { name });
        }

        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(Map::new()));
        let catalog = self.catalog.clone();
        let task_name = name.clone();
        let started = Instant::now();

        // Own task per call: a panicking handler surfaces as a JoinError.
        let outcome = match tokio::spawn(async move { catalog.call_tool(&task_name, arguments).await }).await
        {
            Ok(outcome) => outcome,
            Err(join_err) => Err(ToolError::Handler {
                tool: name.clone(),
                reason: join_failure(join_err),
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(payload) => {
                tracing::info!(tool = %name, elapsed_ms, "tool call succeeded");
                let text = match payload {
                    Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other).map_err(internal_error)?,
                };
                Ok(CallToolResult::text(text))
            }
            Err(err) => {
                tracing::warn!(tool = %name, elapsed_ms, kind = err.kind(), error = %err, "tool call failed");
                error_result(&err)
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn error_result(err: &ToolError) -> Result<CallToolResult, JsonRpcError> {
    let text = serde_json::to_string_pretty(&err.detail()).map_err(internal_error)?;
    Ok(CallToolResult::error(text))
}

fn to_response<T: serde::Serialize>(id: Option<JsonRpcId>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::ok(id, value),
        Err(e) => JsonRpcResponse::err(id, internal_error(e)),
    }
}

fn internal_error(e: serde_json::Error) -> JsonRpcError {
    JsonRpcError::new(error_codes::INTERNAL_ERROR, "internal error").with_detail(e.to_string())
}

fn join_failure(err: JoinError) -> String {
    if err.is_cancelled() {
        return "handler task cancelled".to_string();
    }
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}

/// Best-effort copy of `response` onto the session stream. Never waits on the
/// client, so a stalled stream cannot hold up the direct reply.
fn deliver(session: Option<&Session>, response: &JsonRpcResponse) {
    let Some(session) = session else {
        return;
    };
    match serde_json::to_string(response) {
        Ok(payload) => {
            if let Err(e) = session.send(payload) {
                tracing::debug!(session = %session.id(), error = %e, "session write skipped");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize response"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_server::catalog::ToolRegistry;
    use crate::mcp_server::sessions::{SessionEvent, SessionRegistry};
    use crate::mcp_server::types::ToolDefinition;
    use crate::upstream::UpstreamError;
    use std::time::Duration;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    fn router() -> MessageRouter {
        let mut reg = ToolRegistry::new();
        reg.register_fn(def("echo"), |args| async move { Ok(args) });
        reg.register_fn(def("greet"), |_| async { Ok(json!("hello")) });
        reg.register_fn(def("explode"), |_| async {
            if true {
                panic!("kaboom");
            }
            Ok(Value::Null)
        });
        reg.register_fn(def("forbidden"), |_| async {
            Err(ToolError::Upstream(UpstreamError::Terminal {
                endpoint: "me".into(),
                status: 403,
                code: Some(200),
                error_type: Some("OAuthException".into()),
                message: "Permissions error".into(),
            }))
        });
        MessageRouter::new(
            Arc::new(reg),
            ServerInfo {
                name: "graph-relay".into(),
                version: "test".into(),
            },
        )
    }

    async fn call(router: &MessageRouter, body: Value) -> JsonRpcResponse {
        router.handle_raw(&body.to_string(), None).await.unwrap()
    }

    fn result_text(resp: &JsonRpcResponse) -> String {
        resp.result.as_ref().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_unknown_operation_is_error_result_with_matching_id() {
        let r = router();
        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": 42, "method": "tools/call", "params": {"name": "nope", "arguments": {}}}),
        )
        .await;
        assert_eq!(resp.id, Some(JsonRpcId::Number(42.into())));
        assert!(resp.error.is_none());
        let result = resp.result.as_ref().unwrap();
        assert_eq!(result["isError"], true);
        assert!(result_text(&resp).contains("unknown_operation"));
    }

    #[tokio::test]
    async fn test_call_success_payloads() {
        let r = router();
        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/call", "params": {"name": "greet"}}),
        )
        .await;
        assert_eq!(result_text(&resp), "hello");
        assert!(resp.result.as_ref().unwrap().get("isError").is_none());

        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "echo", "arguments": {"x": 1}}}),
        )
        .await;
        let echoed: Value = serde_json::from_str(&result_text(&resp)).unwrap();
        assert_eq!(echoed, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error_result() {
        let r = router();
        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "explode"}}),
        )
        .await;
        assert_eq!(resp.id, Some(JsonRpcId::Number(7.into())));
        assert_eq!(resp.result.as_ref().unwrap()["isError"], true);
        assert!(result_text(&resp).contains("kaboom"));
    }

    #[tokio::test]
    async fn test_upstream_failure_detail_in_result() {
        let r = router();
        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "forbidden"}}),
        )
        .await;
        let detail: Value = serde_json::from_str(&result_text(&resp)).unwrap();
        assert_eq!(detail["error"]["kind"], "terminal");
        assert_eq!(detail["error"]["code"], 200);
        assert_eq!(detail["error"]["endpoint"], "me");
    }

    #[tokio::test]
    async fn test_missing_call_params_is_invalid_params() {
        let r = router();
        let resp = call(&r, json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call"})).await;
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::INVALID_PARAMS);
        assert_eq!(resp.id, Some(JsonRpcId::Number(5.into())));
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let r = router();
        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2024-11-05"}}),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "graph-relay");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);

        let resp = call(
            &r,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "1999-01-01"}}),
        )
        .await;
        assert_eq!(
            resp.result.unwrap()["protocolVersion"],
            SUPPORTED_PROTOCOL_VERSIONS[0]
        );
    }

    #[tokio::test]
    async fn test_list_returns_catalog_in_order() {
        let r = router();
        let resp = call(&r, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["echo", "greet", "explode", "forbidden"]);
        assert!(tools[0].get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn test_ping_and_notification() {
        let r = router();
        let resp = call(&r, json!({"jsonrpc": "2.0", "id": 9, "method": "ping"})).await;
        assert_eq!(resp.result, Some(json!({})));

        let none = r
            .handle_raw(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                None,
            )
            .await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_and_envelope_errors() {
        let r = router();
        let resp = call(&r, json!({"jsonrpc": "2.0", "id": 11, "method": "resources/list"})).await;
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(resp.id, Some(JsonRpcId::Number(11.into())));

        let resp = call(&r, json!({"jsonrpc": "2.0", "method": "resources/list"})).await;
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(resp.id, None);

        let resp = r.handle_raw("{not json", None).await.unwrap();
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::PARSE_ERROR);
        assert_eq!(resp.id, None);

        let resp = r.handle_raw("[]", None).await.unwrap();
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::INVALID_REQUEST);

        let resp = call(&r, json!({"jsonrpc": "1.0", "id": 4, "method": "ping"})).await;
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::INVALID_REQUEST);
        assert_eq!(resp.id, Some(JsonRpcId::Number(4.into())));

        let resp = call(&r, json!({"jsonrpc": "2.0", "id": 6})).await;
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::INVALID_REQUEST);
        assert_eq!(resp.id, Some(JsonRpcId::Number(6.into())));
    }

    #[tokio::test]
    async fn test_non_integer_numeric_ids_echoed() {
        let r = router();
        for raw in ["1.5", "18446744073709551615", "-0.25"] {
            let body = format!(r#"{{"jsonrpc":"2.0","id":{raw},"method":"ping"}}"#);
            let resp = r.handle_raw(&body, None).await.unwrap();
            assert_eq!(resp.result, Some(json!({})));
            let echoed = serde_json::to_value(&resp).unwrap();
            let expected: Value = serde_json::from_str(raw).unwrap();
            assert_eq!(echoed["id"], expected);
        }

        let resp = r
            .handle_raw(r#"{"jsonrpc":"2.0","id":2.5,"method":"resources/list"}"#, None)
            .await
            .unwrap();
        assert_eq!(resp.error.as_ref().unwrap().code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(
            resp.id,
            Some(JsonRpcId::Number(serde_json::Number::from_f64(2.5).unwrap()))
        );
    }

    #[tokio::test]
    async fn test_response_also_written_to_session() {
        let r = router();
        let sessions = SessionRegistry::new(Duration::from_secs(30), 8);
        let mut handle = sessions.open();
        let session = sessions.lookup(&handle.id()).unwrap();

        let resp = r
            .handle_raw(
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
                Some(&session),
            )
            .await
            .unwrap();

        let Some(SessionEvent::Message(payload)) = handle.recv().await else {
            panic!("expected a message event");
        };
        let streamed: JsonRpcResponse = serde_json::from_str(&payload).unwrap();
        assert_eq!(streamed.id, resp.id);
        assert_eq!(streamed.result, resp.result);
    }

    #[tokio::test]
    async fn test_closed_session_still_returns_direct_reply() {
        let r = router();
        let sessions = SessionRegistry::new(Duration::from_secs(30), 8);
        let handle = sessions.open();
        let session = sessions.lookup(&handle.id()).unwrap();
        drop(handle);

        let resp = r
            .handle_raw(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, Some(&session))
            .await;
        assert!(resp.is_some());
    }

    #[tokio::test]
    async fn test_backlogged_session_does_not_hold_direct_reply() {
        let r = router();
        let sessions = SessionRegistry::new(Duration::from_secs(30), 2);
        // Stream side is never read.
        let handle = sessions.open();
        let session = sessions.lookup(&handle.id()).unwrap();
        let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

        for _ in 0..3 {
            let resp = tokio::time::timeout(
                Duration::from_secs(5),
                r.handle_raw(ping, Some(&session)),
            )
            .await
            .expect("reply must not wait on the session stream");
            assert_eq!(resp.unwrap().result, Some(json!({})));
        }
        assert!(!session.is_open());
        drop(handle);
    }
}
