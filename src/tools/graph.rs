//! Passthrough operations over the upstream graph API.
//!
//! Handlers know nothing about particular resources: they turn arguments
//! into an endpoint plus parameters and hand the call to the pagination
//! layer. Object ids and edge names are restricted to path-safe characters
//! so a caller can never redirect a request to another host.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::mcp_server::ToolError;
use crate::upstream::{HttpMethod, PaginationAggregator};

/// Handler set bound to one upstream.
pub struct GraphTools {
    aggregator: Arc<PaginationAggregator>,
}

impl GraphTools {
    pub fn new(aggregator: Arc<PaginationAggregator>) -> Self {
        Self { aggregator }
    }

    /// `GET {id}` with optional field selection.
    pub async fn get_object(&self, args: Value) -> Result<Value, ToolError> {
        const TOOL: &str = "get_object";
        let id = path_segment(TOOL, &args, "id")?;
        let mut params = extra_params(TOOL, &args)?;
        apply_fields(TOOL, &args, &mut params)?;

        Ok(self
            .aggregator
            .fetch(&id, &params, HttpMethod::Get, false)
            .await?)
    }

    /// `GET {id}/{edge}`, draining every page unless `paginate` is false.
    pub async fn list_edge(&self, args: Value) -> Result<Value, ToolError> {
        const TOOL: &str = "list_edge";
        let id = path_segment(TOOL, &args, "id")?;
        let edge = path_segment(TOOL, &args, "edge")?;
        let mut params = extra_params(TOOL, &args)?;
        apply_fields(TOOL, &args, &mut params)?;

        if let Some(limit) = args.get("limit") {
            let limit = limit.as_u64().filter(|n| *n > 0).ok_or_else(|| invalid(
                TOOL,
                "'limit' must be a positive integer",
            ))?;
            params.insert("limit".into(), json!(limit));
        }

        let paginate = match args.get("paginate") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(invalid(TOOL, "'paginate' must be a boolean")),
        };

        Ok(self
            .aggregator
            .fetch(&format!("{id}/{edge}"), &params, HttpMethod::Get, paginate)
            .await?)
    }

    /// `POST {id}/{edge}` with `params` as the JSON body.
    pub async fn create_edge(&self, args: Value) -> Result<Value, ToolError> {
        const TOOL: &str = "create_edge";
        let id = path_segment(TOOL, &args, "id")?;
        let edge = path_segment(TOOL, &args, "edge")?;
        let params = extra_params(TOOL, &args)?;

        Ok(self
            .aggregator
            .fetch(&format!("{id}/{edge}"), &params, HttpMethod::Post, false)
            .await?)
    }

    /// `DELETE {id}`.
    pub async fn delete_object(&self, args: Value) -> Result<Value, ToolError> {
        const TOOL: &str = "delete_object";
        let id = path_segment(TOOL, &args, "id")?;

        Ok(self
            .aggregator
            .fetch(&id, &Map::new(), HttpMethod::Delete, false)
            .await?)
    }

    /// Utilisation of the local rate window. Issues no upstream request.
    pub async fn rate_limit_status(&self, _args: Value) -> Result<Value, ToolError> {
        let snapshot = self.aggregator.requester().limiter().snapshot().await;
        serde_json::to_value(snapshot).map_err(|e| ToolError::Handler {
            tool: "rate_limit_status".into(),
            reason: e.to_string(),
        })
    }
}

// ─── Argument helpers ────────────────────────────────────────────────────────

fn invalid(tool: &str, reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

/// A required string argument usable as one URL path segment.
fn path_segment(tool: &str, args: &Value, key: &str) -> Result<String, ToolError> {
    let raw = args
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(tool, format!("'{key}' must be a non-empty string")))?;

    let path_safe = raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if !path_safe || raw.starts_with('.') {
        return Err(invalid(
            tool,
            format!("'{key}' contains characters not allowed in a path segment"),
        ));
    }
    Ok(raw.to_string())
}

/// The optional free-form `params` object.
fn extra_params(tool: &str, args: &Value) -> Result<Map<String, Value>, ToolError> {
    match args.get("params") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(invalid(tool, "'params' must be an object")),
    }
}

/// `fields` as a comma-separated string or an array of names.
fn apply_fields(tool: &str, args: &Value, params: &mut Map<String, Value>) -> Result<(), ToolError> {
    let fields = match args.get("fields") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => {
            let names: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            names
                .ok_or_else(|| invalid(tool, "'fields' array must contain only strings"))?
                .join(",")
        }
        Some(_) => return Err(invalid(tool, "'fields' must be a string or array of strings")),
    };
    if !fields.is_empty() {
        params.insert("fields".into(), Value::String(fields));
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
