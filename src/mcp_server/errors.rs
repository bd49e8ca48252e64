//! MCP server error types.

use serde_json::{json, Value};
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Failures of a single tool invocation.
///
/// These never become transport-level errors: the router renders them into
/// an `isError: true` tool result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool not found in the catalog.
    #[error("unknown operation: '{name}'")]
    UnknownTool { name: String },

    /// Tool call arguments failed validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The upstream call behind the tool failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The handler itself failed (including panics).
    #[error("operation '{tool}' failed: {reason}")]
    Handler { tool: String, reason: String },
}

impl ToolError {
    /// Stable machine-readable tag for the failure category.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool { .. } => "unknown_operation",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
            ToolError::Upstream(_) => "upstream",
            ToolError::Handler { .. } => "handler",
        }
    }

    /// Structured description placed in the error tool result.
    pub fn detail(&self) -> Value {
        match self {
            ToolError::Upstream(e) => json!({ "error": e.detail() }),
            other => json!({
                "error": {
                    "kind": other.kind(),
                    "message": other.to_string(),
                }
            }),
        }
    }
}

/// Failures writing to a session channel.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{id}' is closed")]
    Closed { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_detail() {
        let err = ToolError::UnknownTool {
            name: "nope".into(),
        };
        let d = err.detail();
        assert_eq!(d["error"]["kind"], "unknown_operation");
        assert_eq!(d["error"]["message"], "unknown operation: 'nope'");
    }

    #[test]
    fn test_upstream_detail_passes_through() {
        let err = ToolError::from(UpstreamError::Terminal {
            endpoint: "act_9/insights".into(),
            status: 400,
            code: Some(100),
            error_type: Some("OAuthException".into()),
            message: "Invalid parameter".into(),
        });
        let d = err.detail();
        assert_eq!(d["error"]["kind"], "terminal");
        assert_eq!(d["error"]["endpoint"], "act_9/insights");
        assert_eq!(d["error"]["code"], 100);
        assert_eq!(d["error"]["type"], "OAuthException");
    }
}
