//! Collaborator traits for the tool registry
//!
//! The registry depends only on these seams, so tests and embedders can
//! substitute their own configuration sources and sessions.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{CallOutput, JsonObject, McpResult, ServerConfig, ToolDescriptor, ToolStream};

/// Supplies the ordered list of servers to connect to.
///
/// Called once per `initialize`/`reconnect`; the result may be empty.
pub trait ConfigSource: Send + Sync {
    fn server_configs(&self) -> McpResult<Vec<ServerConfig>>;
}

/// One connection to a single remote server through exactly one transport
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Name of the server this session talks to
    fn server_name(&self) -> &str;

    /// Perform the transport handshake
    async fn connect(&self) -> McpResult<()>;

    /// Fetch the tool descriptors advertised by the server
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>>;

    /// Call a tool and normalize its result
    async fn call_tool(&self, name: &str, arguments: JsonObject) -> McpResult<CallOutput>;

    /// Call a tool, receiving its output as a sequence of chunks
    async fn call_tool_stream(&self, name: &str, arguments: JsonObject) -> McpResult<ToolStream>;

    /// Release the connection. Safe to call when `connect` never completed.
    async fn close(&self) -> McpResult<()>;
}

/// Builds an unconnected session for a validated configuration
pub trait SessionFactory: Send + Sync {
    /// Fails fast when the configuration cannot describe a usable transport
    fn create_session(&self, config: &ServerConfig) -> McpResult<Arc<dyn McpSession>>;
}
