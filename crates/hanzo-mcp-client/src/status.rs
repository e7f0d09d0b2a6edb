//! Registry lifecycle state and the status signal hosts display

use serde::{Deserialize, Serialize};

/// Where the registry is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Initializing,
    Reconnecting,
    Ready,
    /// Initialization stopped; the message says why
    Error(String),
    Disposed,
}

/// Status published to subscribers after every lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistryStatus {
    Initializing,
    Ready {
        server_count: usize,
        tool_count: usize,
        /// Servers skipped under the continue-on-error policy
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_servers: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl RegistryStatus {
    /// One-line summary for a status bar
    pub fn text(&self) -> String {
        match self {
            RegistryStatus::Initializing => "MCP: initializing...".to_string(),
            RegistryStatus::Ready {
                server_count,
                tool_count,
                failed_servers,
            } => {
                let mut text = format!(
                    "MCP: {}, {}",
                    plural(*server_count, "server"),
                    plural(*tool_count, "tool")
                );
                if !failed_servers.is_empty() {
                    text.push_str(&format!(", {} failed", failed_servers.len()));
                }
                text
            }
            RegistryStatus::Error { message } => format!("MCP error: {}", message),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RegistryStatus::Ready { .. })
    }
}

impl std::fmt::Display for RegistryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
