//! Hanzo MCP Client - tool registry over Model Context Protocol servers
//!
//! Connects to every configured MCP server, discovers their tools and
//! routes tool calls to the server that owns each tool.
//!
//! # Features
//!
//! - **Multiple Transports**: streamable HTTP, SSE, subprocess (stdio)
//! - **Single Namespace**: tools from all servers merged by name
//! - **Streaming Calls**: progress chunks forwarded as they arrive
//! - **Status Signal**: lifecycle updates for status bars
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hanzo_mcp_client::ToolRegistry;
//! use hanzo_mcp_core::FileConfigSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = FileConfigSource::new("mcp-servers.toml");
//!     let registry = ToolRegistry::with_transports(Arc::new(source));
//!     registry.initialize().await?;
//!
//!     for tool in registry.get_available_tools().await {
//!         println!("{} ({})", tool.name, tool.owner_server);
//!     }
//!
//!     let result = registry
//!         .call_tool("run_query", serde_json::json!({"sql": "SELECT 1"}))
//!         .await;
//!     println!("{:?}", result);
//!
//!     registry.dispose().await;
//!     Ok(())
//! }
//! ```

mod handler;
mod registry;
mod session;
mod status;
mod stderr;
mod stream;
mod transport;

pub use registry::{FailurePolicy, ToolRegistry};
pub use session::RmcpSession;
pub use status::{RegistryState, RegistryStatus};
pub use stderr::STDERR_TAIL_LINES;
pub use stream::StreamHandle;
pub use transport::{
    normalize_endpoint, TransportFactory, TransportPlan, CHILD_AUTH_TOKEN_ENV, CHILD_TIMEOUT_ENV,
    TOKEN_QUERY_PARAM,
};

// Re-export core types for convenience
pub use hanzo_mcp_core::{
    CallOutput, ConfigSource, McpError, McpResult, McpSession, ServerConfig, SessionFactory, Tool,
    ToolCallResult,
};
