//! MCP server — the inbound side.
//!
//! Clients open SSE sessions (or call directly), send JSON-RPC messages, and
//! the router dispatches `tools/call` into a [`ToolCatalog`]. Results are
//! written to the originating session and returned synchronously.

pub mod catalog;
pub mod errors;
pub mod router;
pub mod sessions;
pub mod transport;
pub mod types;

pub use catalog::{FnHandler, ToolCatalog, ToolHandler, ToolRegistry};
pub use errors::{SessionError, ToolError};
pub use router::{MessageRouter, SUPPORTED_PROTOCOL_VERSIONS};
pub use sessions::{Session, SessionEvent, SessionHandle, SessionId, SessionRegistry, SessionState};
pub use transport::{build_router, serve, AppState};
pub use types::{
    CallToolResult, ContentBlock, JsonRpcError, JsonRpcId, JsonRpcResponse, ProtocolMessage,
    ServerInfo, ToolDefinition,
};
