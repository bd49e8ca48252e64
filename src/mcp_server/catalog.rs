//! Tool catalog — the named operations exposed to callers.
//!
//! The router only depends on [`ToolCatalog`]. [`ToolRegistry`] is the
//! in-process implementation: definitions plus handlers, with a basic
//! structural check of arguments against each tool's `required` fields.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::errors::ToolError;
use super::types::ToolDefinition;

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A list of named operations and a way to invoke them.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Definitions in advertisement order.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    fn contains(&self, name: &str) -> bool;

    /// Invoke `name` with `arguments`, returning the result payload.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;
}

/// Handler behind one registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.0)(arguments).await
    }
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Ordered set of tools with their handlers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration with the same name replaces the
    /// earlier one in place.
    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let tool = RegisteredTool {
            definition,
            handler,
        };
        match self
            .tools
            .iter_mut()
            .find(|t| t.definition.name == tool.definition.name)
        {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(definition, Arc::new(FnHandler(f)));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.definition.name == name)
    }

    /// Validate arguments against the tool's schema.
    ///
    /// Structural check only: arguments must be an object (or absent) and
    /// every `required` field must be present.
    pub fn validate_arguments(&self, tool_name: &str, arguments: &Value) -> Result<(), ToolError> {
        let tool = self.get(tool_name).ok_or_else(|| ToolError::UnknownTool {
            name: tool_name.to_string(),
        })?;

        if !arguments.is_object() && !arguments.is_null() {
            return Err(ToolError::InvalidArguments {
                tool: tool_name.to_string(),
                reason: "arguments must be an object".into(),
            });
        }

        if let Some(required) = tool
            .definition
            .input_schema
            .get("required")
            .and_then(Value::as_array)
        {
            let args_obj = arguments.as_object();
            for field_name in required.iter().filter_map(Value::as_str) {
                let has_field = args_obj
                    .map(|obj| obj.contains_key(field_name))
                    .unwrap_or(false);
                if !has_field {
                    return Err(ToolError::InvalidArguments {
                        tool: tool_name.to_string(),
                        reason: format!("missing required field: '{field_name}'"),
                    });
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ToolCatalog for ToolRegistry {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        self.validate_arguments(name, &arguments)?;
        let handler = self
            .get(name)
            .map(|t| t.handler.clone())
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;
        handler.call(arguments).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
