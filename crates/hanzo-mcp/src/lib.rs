//! # Hanzo MCP - Unified Model Context Protocol tool registry
//!
//! This crate provides a unified interface to the Hanzo MCP tool registry:
//!
//! - **Core types and traits** (`hanzo-mcp-core`) - configuration, tools, errors
//! - **Client** (`hanzo-mcp-client`) - transports, sessions and the registry
//!
//! It also ships the `hanzo-mcp` command-line tool for inspecting configured
//! servers and calling their tools.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hanzo_mcp::client::ToolRegistry;
//! use hanzo_mcp::{ServerConfig, StaticConfigSource};
//! use std::sync::Arc;
//!
//! let source = StaticConfigSource::new(vec![
//!     ServerConfig::stream_http("db", "localhost:8931/mcp").with_auth_token("secret"),
//!     ServerConfig::subprocess("files", "mcp-server-filesystem", vec!["/tmp".into()]),
//! ]);
//!
//! let registry = ToolRegistry::with_transports(Arc::new(source));
//! registry.initialize().await?;
//!
//! let result = registry
//!     .call_tool("run_query", serde_json::json!({"sql": "SELECT 1"}))
//!     .await;
//!
//! let handle = registry
//!     .call_tool_stream("tail_logs", serde_json::json!({}), |chunk| println!("{chunk}"))
//!     .await?;
//! handle.finished().await?;
//!
//! registry.dispose().await;
//! ```

// Re-export core types - these are always available
pub use hanzo_mcp_core::*;

/// MCP client functionality
///
/// Connect to MCP servers, discover their tools and dispatch calls.
pub mod client {
    pub use hanzo_mcp_client::*;
}
