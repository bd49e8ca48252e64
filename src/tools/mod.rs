//! The tool catalog served by the relay.
//!
//! A small, resource-agnostic set of passthrough operations over the
//! upstream API. Each definition carries a JSON schema whose `required`
//! list is enforced by the registry before the handler runs.

pub mod graph;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::mcp_server::{ToolDefinition, ToolRegistry};
use crate::upstream::PaginationAggregator;

pub use graph::GraphTools;

/// Build the registry of passthrough tools bound to `aggregator`.
pub fn graph_catalog(aggregator: Arc<PaginationAggregator>) -> ToolRegistry {
    let tools = Arc::new(GraphTools::new(aggregator));
    let mut registry = ToolRegistry::new();

    let t = tools.clone();
    registry.register_fn(
        definition(
            "get_object",
            "Fetch a single object by id.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Object id, e.g. act_123" },
                    "fields": fields_schema(),
                    "params": params_schema(),
                },
                "required": ["id"],
            }),
        ),
        move |args| {
            let t = t.clone();
            async move { t.get_object(args).await }
        },
    );

    let t = tools.clone();
    registry.register_fn(
        definition(
            "list_edge",
            "List the objects on an edge of a node. All pages are fetched and concatenated unless paginate is false.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Parent object id" },
                    "edge": { "type": "string", "description": "Edge name, e.g. campaigns" },
                    "fields": fields_schema(),
                    "limit": { "type": "integer", "minimum": 1, "description": "Page size" },
                    "paginate": { "type": "boolean", "default": true },
                    "params": params_schema(),
                },
                "required": ["id", "edge"],
            }),
        ),
        move |args| {
            let t = t.clone();
            async move { t.list_edge(args).await }
        },
    );

    let t = tools.clone();
    registry.register_fn(
        definition(
            "create_edge",
            "Create an object on an edge of a node.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Parent object id" },
                    "edge": { "type": "string", "description": "Edge name" },
                    "params": params_schema(),
                },
                "required": ["id", "edge", "params"],
            }),
        ),
        move |args| {
            let t = t.clone();
            async move { t.create_edge(args).await }
        },
    );

    let t = tools.clone();
    registry.register_fn(
        definition(
            "delete_object",
            "Delete an object by id.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Object id" },
                },
                "required": ["id"],
            }),
        ),
        move |args| {
            let t = t.clone();
            async move { t.delete_object(args).await }
        },
    );

    let t = tools;
    registry.register_fn(
        definition(
            "rate_limit_status",
            "Report how much of the local request quota is in use.",
            json!({ "type": "object", "properties": {} }),
        ),
        move |args| {
            let t = t.clone();
            async move { t.rate_limit_status(args).await }
        },
    );

    registry
}

fn definition(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn fields_schema() -> Value {
    json!({
        "description": "Fields to return, comma-separated or as a list",
        "oneOf": [
            { "type": "string" },
            { "type": "array", "items": { "type": "string" } },
        ],
    })
}

fn params_schema() -> Value {
    json!({ "type": "object", "description": "Additional request parameters" })
}
