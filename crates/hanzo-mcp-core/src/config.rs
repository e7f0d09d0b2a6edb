//! Configuration types for MCP server connections
//!
//! Raw server descriptors come from an external source (a TOML/JSON file, or
//! an embedding application). Each descriptor is validated independently:
//! a malformed entry is logged and dropped without affecting the rest.

use crate::traits::ConfigSource;
use crate::{McpError, McpResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default reconnection retry count
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Environment variable holding a fallback bearer token
pub const AUTH_TOKEN_ENV: &str = "HANZO_MCP_AUTH_TOKEN";

/// Environment variable permitting non-TLS endpoints (`1`, `true`, `yes`)
pub const ALLOW_INSECURE_ENV: &str = "HANZO_MCP_ALLOW_INSECURE";

/// Supported transport kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Bidirectional streamable HTTP
    StreamHttp,
    /// Server-push-only HTTP (server-sent events)
    PushHttp,
    /// Local subprocess over stdin/stdout
    Subprocess,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::StreamHttp => write!(f, "stream-http"),
            TransportKind::PushHttp => write!(f, "push-http"),
            TransportKind::Subprocess => write!(f, "subprocess"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream-http" | "http" | "streamable-http" | "streamable_http" => {
                Ok(TransportKind::StreamHttp)
            }
            "push-http" | "sse" => Ok(TransportKind::PushHttp),
            "subprocess" | "stdio" | "process" => Ok(TransportKind::Subprocess),
            other => Err(McpError::configuration(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}

/// Transport-specific connection recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Streamable HTTP endpoint
    StreamHttp {
        /// Endpoint URL, scheme optional
        endpoint: String,
        /// Extra request headers
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Force the endpoint path to end with `/`
        #[serde(default = "default_true")]
        trailing_slash: bool,
    },
    /// Server-sent events endpoint
    PushHttp {
        /// Endpoint URL, scheme optional
        endpoint: String,
    },
    /// Local process speaking the protocol on stdin/stdout
    Subprocess {
        /// Command to execute
        command: String,
        /// Arguments to pass to the command
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables for the child
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory for the child
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
}

fn default_true() -> bool {
    true
}

impl TransportConfig {
    /// The kind tag of this transport
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::StreamHttp { .. } => TransportKind::StreamHttp,
            TransportConfig::PushHttp { .. } => TransportKind::PushHttp,
            TransportConfig::Subprocess { .. } => TransportKind::Subprocess,
        }
    }
}

/// Validated identity and connection recipe for one remote tool provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server name
    pub name: String,
    /// How to reach the server
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Bearer credential
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Permit plain-HTTP endpoints and unverified certificates
    #[serde(default)]
    pub allow_insecure: bool,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum reconnection attempts
    pub retry_count: u32,
}

impl ServerConfig {
    fn with_transport(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            auth_token: None,
            allow_insecure: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }

    /// Streamable HTTP server with default settings
    pub fn stream_http(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_transport(
            name,
            TransportConfig::StreamHttp {
                endpoint: endpoint.into(),
                headers: BTreeMap::new(),
                trailing_slash: true,
            },
        )
    }

    /// Server-sent events server with default settings
    pub fn push_http(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_transport(
            name,
            TransportConfig::PushHttp {
                endpoint: endpoint.into(),
            },
        )
    }

    /// Subprocess server with default settings
    pub fn subprocess(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self::with_transport(
            name,
            TransportConfig::Subprocess {
                command: command.into(),
                args,
                env: BTreeMap::new(),
                cwd: None,
            },
        )
    }

    /// Set the bearer token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Permit insecure endpoints
    pub fn with_allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Set the request timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the reconnection retry count
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// The transport kind tag
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// The request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reconnection backoff derived from `retry_count`
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::with_max_retries(self.retry_count)
    }
}

/// Fallback values read from the process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    /// Used when a descriptor has no `authToken`
    pub auth_token: Option<String>,
    /// Used when a descriptor has no `allowInsecure`
    pub allow_insecure: bool,
}

impl EnvDefaults {
    /// Read [`AUTH_TOKEN_ENV`] and [`ALLOW_INSECURE_ENV`]
    pub fn from_env() -> Self {
        let auth_token = std::env::var(AUTH_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        let allow_insecure = std::env::var(ALLOW_INSECURE_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            auth_token,
            allow_insecure,
        }
    }
}

/// Server descriptor before validation
///
/// Accepts both camelCase and snake_case keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServerConfig {
    pub name: Option<String>,
    #[serde(alias = "transportKind", alias = "transport_kind", alias = "type")]
    pub transport: Option<String>,
    #[serde(alias = "url")]
    pub endpoint: Option<String>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    #[serde(alias = "work_dir", alias = "workDir")]
    pub cwd: Option<PathBuf>,
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(alias = "authToken")]
    pub auth_token: Option<String>,
    #[serde(alias = "allowInsecure")]
    pub allow_insecure: Option<bool>,
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    #[serde(alias = "retryCount")]
    pub retry_count: Option<u32>,
    #[serde(alias = "trailingSlash")]
    pub trailing_slash: Option<bool>,
    pub enabled: Option<bool>,
}

impl RawServerConfig {
    /// Validate this descriptor and fill defaults
    pub fn validate(self, env: &EnvDefaults) -> McpResult<ServerConfig> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| McpError::configuration("server entry is missing a 'name'"))?;

        let kind: TransportKind = self
            .transport
            .as_deref()
            .ok_or_else(|| {
                McpError::configuration(format!("server '{}' has no 'transport'", name))
            })?
            .parse()
            .map_err(|e: McpError| McpError::configuration(format!("server '{}': {}", name, e)))?;

        let require = |value: Option<String>, field: &str| -> McpResult<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    McpError::configuration(format!(
                        "server '{}' uses {} transport but has no '{}'",
                        name, kind, field
                    ))
                })
        };

        let transport = match kind {
            TransportKind::StreamHttp => TransportConfig::StreamHttp {
                endpoint: require(self.endpoint, "url")?,
                headers: self.headers.unwrap_or_default(),
                trailing_slash: self.trailing_slash.unwrap_or(true),
            },
            TransportKind::PushHttp => TransportConfig::PushHttp {
                endpoint: require(self.endpoint, "url")?,
            },
            TransportKind::Subprocess => TransportConfig::Subprocess {
                command: require(self.command, "command")?,
                args: self.args.unwrap_or_default(),
                env: self.env.unwrap_or_default(),
                cwd: self.cwd,
            },
        };

        let auth_token = self
            .auth_token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| env.auth_token.clone());

        Ok(ServerConfig {
            name,
            transport,
            auth_token,
            allow_insecure: self.allow_insecure.unwrap_or(env.allow_insecure),
            timeout_ms: self
                .timeout_ms
                .filter(|t| *t > 0)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
            retry_count: self.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
        })
    }
}

/// Validate one raw descriptor
pub fn validate(raw: &Value, env: &EnvDefaults) -> McpResult<ServerConfig> {
    let raw: RawServerConfig = serde_json::from_value(raw.clone())
        .map_err(|e| McpError::configuration(format!("malformed server entry: {}", e)))?;
    raw.validate(env)
}

/// Validate a list of raw descriptors, dropping invalid and disabled entries.
///
/// Order is preserved. Never fails: every rejection is logged instead.
pub fn validate_all(raws: &[Value], env: &EnvDefaults) -> Vec<ServerConfig> {
    let mut configs = Vec::with_capacity(raws.len());

    for (index, raw) in raws.iter().enumerate() {
        let enabled = raw.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        if !enabled {
            debug!(index, "Skipping disabled server entry");
            continue;
        }

        match validate(raw, env) {
            Ok(config) => configs.push(config),
            Err(e) => warn!(index, error = %e, "Dropping invalid server entry"),
        }
    }

    configs
}

/// Reconnection backoff: exponential growth capped at a maximum delay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt
    pub factor: f64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Attempts after which retrying stops
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 30_000,
            max_retries: DEFAULT_RETRY_COUNT,
        }
    }
}

impl BackoffPolicy {
    /// Default growth with the given retry budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based), or `None` once the
    /// budget is spent
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.max_retries as usize {
            return None;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.factor.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Some(Duration::from_millis(capped as u64))
    }
}

/// On-disk configuration document
#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default, alias = "mcpServers")]
    servers: Vec<Value>,
    // Legacy single-server shape
    #[serde(alias = "serverUrl", alias = "url")]
    server_url: Option<String>,
    #[serde(alias = "authToken")]
    auth_token: Option<String>,
    #[serde(alias = "allowInsecure")]
    allow_insecure: Option<bool>,
    #[serde(alias = "timeoutMs")]
    timeout_ms: Option<u64>,
    #[serde(alias = "retryCount")]
    retry_count: Option<u32>,
}

impl ConfigDocument {
    fn into_configs(self, env: &EnvDefaults) -> Vec<ServerConfig> {
        if !self.servers.is_empty() {
            return validate_all(&self.servers, env);
        }

        let Some(url) = self.server_url else {
            return Vec::new();
        };

        let legacy = RawServerConfig {
            name: Some("default".to_string()),
            transport: Some(TransportKind::StreamHttp.to_string()),
            endpoint: Some(url),
            auth_token: self.auth_token,
            allow_insecure: self.allow_insecure,
            timeout_ms: self.timeout_ms,
            retry_count: self.retry_count,
            ..Default::default()
        };

        match legacy.validate(env) {
            Ok(config) => {
                debug!("Using legacy single-server configuration");
                vec![config]
            }
            Err(e) => {
                warn!(error = %e, "Dropping invalid legacy server configuration");
                Vec::new()
            }
        }
    }
}

/// Parse a configuration document from TOML or JSON text
pub fn parse_server_configs(
    contents: &str,
    format: ConfigFormat,
    env: &EnvDefaults,
) -> McpResult<Vec<ServerConfig>> {
    let document: ConfigDocument = match format {
        ConfigFormat::Toml => toml::from_str(contents)
            .map_err(|e| McpError::configuration(format!("invalid TOML: {}", e)))?,
        ConfigFormat::Json => serde_json::from_str(contents)
            .map_err(|e| McpError::configuration(format!("invalid JSON: {}", e)))?,
    };
    Ok(document.into_configs(env))
}

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Fixed, in-memory list of server configurations
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    configs: Vec<ServerConfig>,
}

impl StaticConfigSource {
    pub fn new(configs: Vec<ServerConfig>) -> Self {
        Self { configs }
    }
}

impl ConfigSource for StaticConfigSource {
    fn server_configs(&self) -> McpResult<Vec<ServerConfig>> {
        Ok(self.configs.clone())
    }
}

/// Server configurations read from a TOML or JSON file.
///
/// The file is re-read on every call so a reconnect picks up edits.
///
/// ```toml
/// [[servers]]
/// name = "db"
/// transport = "stream-http"
/// url = "localhost:8931/mcp"
/// auth_token = "secret"
///
/// [[servers]]
/// name = "files"
/// transport = "subprocess"
/// command = "mcp-server-filesystem"
/// args = ["/tmp"]
/// ```
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    env: Option<EnvDefaults>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env: None,
        }
    }

    /// Use fixed fallbacks instead of reading the environment
    pub fn with_env_defaults(mut self, env: EnvDefaults) -> Self {
        self.env = Some(env);
        self
    }

    /// `~/.hanzo/mcp-servers.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".hanzo").join("mcp-servers.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn server_configs(&self) -> McpResult<Vec<ServerConfig>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "MCP server config file not found");
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            McpError::configuration(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let env = self.env.clone().unwrap_or_else(EnvDefaults::from_env);
        let configs = parse_server_configs(&contents, ConfigFormat::from_path(&self.path), &env)?;

        info!(
            path = %self.path.display(),
            servers = configs.len(),
            "Loaded MCP server configuration"
        );
        Ok(configs)
    }
}
