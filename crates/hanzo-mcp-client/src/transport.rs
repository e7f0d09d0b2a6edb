//! Transport factory
//!
//! Turns a validated [`ServerConfig`] into a [`TransportPlan`]: the normalized
//! endpoint, credentials and HTTP client (or child-process recipe) that a
//! session needs to connect. Building a plan never touches the network, so
//! invalid recipes fail fast before any connection is attempted.

use crate::session::RmcpSession;
use hanzo_mcp_core::{
    BackoffPolicy, McpError, McpResult, McpSession, ServerConfig, SessionFactory, TransportConfig,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use rmcp::transport::common::client_side_sse::SseRetryPolicy;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Query parameter carrying the token on push-http endpoints
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Child environment variable carrying the bearer token
pub const CHILD_AUTH_TOKEN_ENV: &str = "HANZO_MCP_AUTH_TOKEN";

/// Child environment variable carrying the request timeout
pub const CHILD_TIMEOUT_ENV: &str = "HANZO_MCP_TIMEOUT_MS";

/// Everything a session needs to open its connection
#[derive(Debug, Clone)]
pub enum TransportPlan {
    /// Streamable HTTP: requests and server events over one endpoint
    StreamHttp {
        url: Url,
        /// Headers installed as defaults on `client`, auth included
        headers: HeaderMap,
        client: reqwest::Client,
        backoff: BackoffPolicy,
    },
    /// Server-sent events; credentials travel in the query string
    PushHttp {
        url: Url,
        client: reqwest::Client,
        backoff: BackoffPolicy,
    },
    /// Child process speaking the protocol on stdin/stdout
    Subprocess {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        cwd: Option<PathBuf>,
    },
}

/// Creates rmcp-backed sessions for each transport kind
#[derive(Debug, Clone, Default)]
pub struct TransportFactory;

impl TransportPlan {
    /// Names of the headers sent with every request, sorted. Values are
    /// never exposed.
    pub fn header_names(&self) -> Vec<&str> {
        match self {
            TransportPlan::StreamHttp { headers, .. } => {
                let mut names: Vec<&str> = headers.keys().map(HeaderName::as_str).collect();
                names.sort_unstable();
                names
            }
            _ => Vec::new(),
        }
    }
}

impl TransportFactory {
    pub fn new() -> Self {
        Self
    }

    /// Build the transport plan for a configuration
    pub fn plan(&self, config: &ServerConfig) -> McpResult<TransportPlan> {
        info!(
            server = %config.name,
            transport = %config.kind(),
            "Creating MCP transport"
        );

        build_plan(config).map_err(|e| {
            McpError::configuration(format!(
                "cannot create {} transport for server '{}': {}",
                config.kind(),
                config.name,
                e
            ))
        })
    }
}

impl SessionFactory for TransportFactory {
    fn create_session(&self, config: &ServerConfig) -> McpResult<Arc<dyn McpSession>> {
        let plan = self.plan(config)?;
        Ok(Arc::new(RmcpSession::new(config, plan)))
    }
}

fn build_plan(config: &ServerConfig) -> Result<TransportPlan, String> {
    match &config.transport {
        TransportConfig::StreamHttp {
            endpoint,
            headers,
            trailing_slash,
        } => {
            let url = normalize_endpoint(endpoint, *trailing_slash)?;
            check_insecure(&url, config.allow_insecure)?;

            let mut header_map = HeaderMap::new();
            for (key, value) in headers {
                let name = HeaderName::from_bytes(key.as_bytes())
                    .map_err(|e| format!("invalid header name '{}': {}", key, e))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| format!("invalid value for header '{}': {}", key, e))?;
                header_map.insert(name, value);
            }
            if let Some(token) = &config.auth_token {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| format!("invalid auth token: {}", e))?;
                value.set_sensitive(true);
                header_map.insert(AUTHORIZATION, value);
            }

            let client = http_client(header_map.clone(), config)?;
            let plan = TransportPlan::StreamHttp {
                url: url.clone(),
                headers: header_map,
                client,
                backoff: config.backoff(),
            };
            debug!(
                server = %config.name,
                url = %url,
                headers = ?plan.header_names(),
                "Streamable HTTP endpoint"
            );
            Ok(plan)
        }
        TransportConfig::PushHttp { endpoint } => {
            let mut url = normalize_endpoint(endpoint, false)?;
            check_insecure(&url, config.allow_insecure)?;

            // Event streams cannot carry custom headers
            if let Some(token) = &config.auth_token {
                url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
            }

            let client = http_client(HeaderMap::new(), config)?;
            debug!(server = %config.name, endpoint = %endpoint, "SSE endpoint");

            Ok(TransportPlan::PushHttp {
                url,
                client,
                backoff: config.backoff(),
            })
        }
        TransportConfig::Subprocess {
            command,
            args,
            env,
            cwd,
        } => {
            if command.trim().is_empty() {
                return Err("no command given".to_string());
            }

            let mut child_env = BTreeMap::new();
            if let Some(token) = &config.auth_token {
                child_env.insert(CHILD_AUTH_TOKEN_ENV.to_string(), token.clone());
            }
            child_env.insert(CHILD_TIMEOUT_ENV.to_string(), config.timeout_ms.to_string());
            child_env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));

            Ok(TransportPlan::Subprocess {
                command: command.clone(),
                args: args.clone(),
                env: child_env,
                cwd: cwd.clone(),
            })
        }
    }
}

/// Normalize an endpoint: default the scheme to `http://` and, when asked,
/// make sure the path ends with `/`.
pub fn normalize_endpoint(endpoint: &str, trailing_slash: bool) -> Result<Url, String> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err("no endpoint given".to_string());
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| format!("invalid URL '{}': {}", trimmed, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported URL scheme '{}'", url.scheme()));
    }

    if trailing_slash && !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn check_insecure(url: &Url, allow_insecure: bool) -> Result<(), String> {
    if url.scheme() == "http" && !allow_insecure && !is_loopback(url) {
        return Err(format!(
            "plain HTTP endpoint '{}' requires allow_insecure",
            url.host_str().unwrap_or_default()
        ));
    }
    Ok(())
}

fn is_loopback(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

fn http_client(headers: HeaderMap, config: &ServerConfig) -> Result<reqwest::Client, String> {
    // No whole-request timeout here: event streams stay open. Sessions bound
    // each request themselves.
    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.timeout())
        .danger_accept_invalid_certs(config.allow_insecure)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {}", e))
}

/// rmcp retry policy backed by a [`BackoffPolicy`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct RmcpBackoff(pub BackoffPolicy);

impl SseRetryPolicy for RmcpBackoff {
    fn retry(&self, current_times: usize) -> Option<Duration> {
        self.0.delay_for(current_times)
    }
}
