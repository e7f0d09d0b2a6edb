//! Core types for MCP protocol

use crate::{ErrorKind, McpError, McpResult};
use futures::future::AbortHandle;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// JSON object used for tool arguments
pub type JsonObject = serde_json::Map<String, Value>;

/// Tool descriptor exactly as advertised by a remote server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name of the tool as reported by the server
    pub name: String,
    /// Optional human-facing title
    #[serde(default)]
    pub title: Option<String>,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
    /// JSON Schema for the tool's structured result
    #[serde(default, rename = "outputSchema")]
    pub output_schema: Option<Value>,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty object schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the input schema
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Extract descriptors from a `tools/list` response body.
    ///
    /// An absent or non-array `tools` field yields an empty list. Entries that
    /// do not parse as descriptors are dropped. Both cases are logged.
    pub fn from_listing(server: &str, listing: &Value) -> Vec<ToolDescriptor> {
        let Some(entries) = listing.get("tools") else {
            warn!(server = %server, "tools/list response has no 'tools' field");
            return Vec::new();
        };
        let Some(entries) = entries.as_array() else {
            warn!(server = %server, "tools/list 'tools' field is not an array");
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| match serde_json::from_value::<ToolDescriptor>(entry.clone()) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!(server = %server, error = %e, "Dropping malformed tool descriptor");
                    None
                }
            })
            .collect()
    }
}

/// A callable operation advertised by exactly one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name used for routing and external exposure
    pub name: String,
    /// Human-facing name, defaults to `name`
    pub display_name: String,
    /// Human-facing description, defaults to `name`
    pub description: String,
    /// Argument schema, passed through untouched
    pub input_schema: Value,
    /// Result schema, passed through untouched
    pub output_schema: Option<Value>,
    /// Name of the server that handles calls to this tool
    pub owner_server: String,
}

impl Tool {
    /// Build a registry entry from a remote descriptor
    pub fn from_descriptor(descriptor: ToolDescriptor, owner_server: impl Into<String>) -> Self {
        let display_name = descriptor
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| descriptor.name.clone());
        let description = descriptor
            .description
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| descriptor.name.clone());

        Self {
            name: descriptor.name,
            display_name,
            description,
            input_schema: descriptor.input_schema,
            output_schema: descriptor.output_schema,
            owner_server: owner_server.into(),
        }
    }
}

/// Normalized result of a tool call.
///
/// Produced once at the transport boundary so the registry never has to
/// sniff result shapes itself.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutput {
    /// The first text-typed content part
    Text(String),
    /// Structured content reported alongside non-text parts
    Structured(Value),
    /// Anything else, passed through unchanged
    Raw(Value),
}

impl CallOutput {
    /// Normalize a wire result.
    ///
    /// A list of typed content parts (bare, or under `content`) yields its
    /// first text part. Failing that, `structuredContent` is used. Any other
    /// value is passed through.
    pub fn from_value(value: Value) -> Self {
        if let Some(parts) = content_parts(&value) {
            if let Some(text) = parts.iter().find_map(part_text) {
                return CallOutput::Text(text.to_string());
            }
        }

        match value.get("structuredContent") {
            Some(structured) if !structured.is_null() => CallOutput::Structured(structured.clone()),
            _ => CallOutput::Raw(value),
        }
    }

    /// Normalize a `tools/call` result envelope, turning `isError` results
    /// into execution failures.
    pub fn from_envelope(tool: &str, envelope: Value) -> McpResult<Self> {
        let is_error = envelope
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if is_error {
            let message = content_parts(&envelope)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(part_text)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Tool '{}' reported an error", tool));
            return Err(McpError::execution(tool, message));
        }

        Ok(Self::from_value(envelope))
    }

    /// Convert into plain data for a [`ToolCallResult`]
    pub fn into_value(self) -> Value {
        match self {
            CallOutput::Text(text) => Value::String(text),
            CallOutput::Structured(value) | CallOutput::Raw(value) => value,
        }
    }
}

/// Split one streamed chunk into the values forwarded to a consumer.
///
/// A chunk holding a list of content parts yields one value per part: the
/// part's text when it has one, the raw part otherwise. Any other chunk is
/// forwarded whole.
pub fn chunk_parts(chunk: Value) -> Vec<Value> {
    match content_parts(&chunk) {
        Some(parts) => parts
            .iter()
            .map(|part| match part_text(part) {
                Some(text) => Value::String(text.to_string()),
                None => part.clone(),
            })
            .collect(),
        None => vec![chunk],
    }
}

fn content_parts(value: &Value) -> Option<&Vec<Value>> {
    let parts = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("content")?.as_array()?,
        _ => return None,
    };

    // One typed part marks the list; untyped neighbours are forwarded raw
    let typed = parts.iter().any(|p| p.get("type").is_some());
    if typed {
        Some(parts)
    } else {
        debug!("Result has no typed content parts");
        None
    }
}

fn part_text(part: &Value) -> Option<&str> {
    if part.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    part.get("text").and_then(Value::as_str)
}

/// Outcome of one tool call, returned to the caller and never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Whether the call succeeded
    pub success: bool,
    /// Unwrapped result data, present iff `success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable failure message, present iff not `success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure classification, present iff not `success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolCallResult {
    /// Create a successful result
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    /// Create a failed result from an error
    pub fn failure(error: &McpError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}

/// Chunks of a streaming tool call plus the handle that stops them
pub struct ToolStream {
    /// Raw chunks in arrival order
    pub chunks: BoxStream<'static, McpResult<Value>>,
    /// Aborting stops the chunk source and releases the transport stream
    pub cancel: AbortHandle,
}

impl std::fmt::Debug for ToolStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolStream")
            .field("cancelled", &self.cancel.is_aborted())
            .finish_non_exhaustive()
    }
}
