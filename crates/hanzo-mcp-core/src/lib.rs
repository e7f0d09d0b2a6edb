//! Hanzo MCP Core - Shared types for the MCP tool registry
//!
//! This crate provides the foundational pieces used by `hanzo-mcp-client`:
//!
//! - [`ServerConfig`] and the descriptor validator ([`validate`], [`validate_all`])
//! - Configuration sources ([`FileConfigSource`], [`StaticConfigSource`])
//! - Tool and result types ([`Tool`], [`ToolCallResult`], [`CallOutput`])
//! - The error taxonomy ([`McpError`], [`ErrorKind`])
//! - The collaborator traits the registry is written against
//!   ([`ConfigSource`], [`McpSession`], [`SessionFactory`])
//!
//! # Configuration
//!
//! ```rust
//! use hanzo_mcp_core::{validate_all, EnvDefaults, TransportKind};
//! use serde_json::json;
//!
//! let raws = vec![
//!     json!({"name": "db", "transport": "http", "url": "localhost:8931/mcp"}),
//!     json!({"transport": "http", "url": "http://nameless"}),
//! ];
//!
//! let configs = validate_all(&raws, &EnvDefaults::default());
//! assert_eq!(configs.len(), 1);
//! assert_eq!(configs[0].kind(), TransportKind::StreamHttp);
//! assert_eq!(configs[0].timeout_ms, 10_000);
//! ```

mod config;
mod error;
mod traits;
mod types;

pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
