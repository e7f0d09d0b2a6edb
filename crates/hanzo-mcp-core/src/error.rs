//! Error types for MCP operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of every failure the registry can surface.
///
/// Each [`McpError`] is assigned exactly one kind at the point where it is
/// constructed, so callers can branch on the category without parsing
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or empty server configuration
    Configuration,
    /// Handshake failure, refused connection, spawn failure, DNS error
    Connection,
    /// A handshake or request exceeded its configured timeout
    Timeout,
    /// No tool is registered under the requested name
    NotFound,
    /// The tool exists but its owning server has no live session
    Unavailable,
    /// The remote tool failed or the transport dropped mid-call
    Execution,
    /// The registry was disposed
    Disposed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::Execution => write!(f, "execution"),
            ErrorKind::Disposed => write!(f, "disposed"),
        }
    }
}

/// Errors that can occur during MCP operations
#[derive(Debug, Error)]
pub enum McpError {
    /// Invalid or unreadable server configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connecting to a server failed
    #[error("Connection to server '{server}' failed: {message}")]
    Connection { server: String, message: String },

    /// A request did not complete within its timeout
    #[error("{operation} on server '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Tool not found
    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    /// Owning server has no live session
    #[error("Server '{0}' not available")]
    ServerUnavailable(String),

    /// Tool execution failed
    #[error("{message}")]
    Execution { tool: String, message: String },

    /// Arguments were not a JSON object
    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    /// Operation attempted after dispose
    #[error("Tool registry has been disposed")]
    Disposed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl McpError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        McpError::Configuration(message.into())
    }

    /// Create a connection error for the given server
    pub fn connection(server: impl Into<String>, message: impl Into<String>) -> Self {
        McpError::Connection {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for the given server and operation
    pub fn timeout(server: impl Into<String>, operation: impl Into<String>, timeout_ms: u64) -> Self {
        McpError::Timeout {
            server: server.into(),
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an execution error for the given tool
    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        McpError::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Configuration(_) => ErrorKind::Configuration,
            McpError::Connection { .. } => ErrorKind::Connection,
            McpError::Timeout { .. } => ErrorKind::Timeout,
            McpError::ToolNotFound(_) => ErrorKind::NotFound,
            McpError::ServerUnavailable(_) => ErrorKind::Unavailable,
            McpError::Execution { .. } | McpError::InvalidArguments { .. } => ErrorKind::Execution,
            McpError::Disposed => ErrorKind::Disposed,
            McpError::Serialization(_) => ErrorKind::Execution,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;
