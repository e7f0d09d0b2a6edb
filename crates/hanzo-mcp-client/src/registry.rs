//! Tool registry
//!
//! Connects to every configured server, merges their tools into one
//! namespace and routes each call to the session owning the tool.

use crate::status::{RegistryState, RegistryStatus};
use crate::stream::StreamHandle;
use crate::transport::TransportFactory;
use hanzo_mcp_core::{
    BackoffPolicy, CallOutput, ConfigSource, JsonObject, McpError, McpResult, McpSession,
    ServerConfig, SessionFactory, Tool, ToolCallResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// What initialization does when one server fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failing server; earlier servers stay registered
    #[default]
    FailFast,
    /// Skip failing servers and report them in the status
    ContinueOnError,
}

/// Registry of tools across all configured MCP servers
pub struct ToolRegistry {
    source: Arc<dyn ConfigSource>,
    factory: Arc<dyn SessionFactory>,
    policy: FailurePolicy,
    sessions: RwLock<HashMap<String, Arc<dyn McpSession>>>,
    tools: RwLock<HashMap<String, Tool>>,
    tools_by_server: RwLock<HashMap<String, Vec<String>>>,
    state: RwLock<RegistryState>,
    status: watch::Sender<RegistryStatus>,
    lifecycle: Mutex<()>,
}

impl ToolRegistry {
    /// Create a registry with an explicit session factory
    pub fn new(source: Arc<dyn ConfigSource>, factory: Arc<dyn SessionFactory>) -> Self {
        let (status, _) = watch::channel(RegistryStatus::Initializing);
        Self {
            source,
            factory,
            policy: FailurePolicy::default(),
            sessions: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
            tools_by_server: RwLock::new(HashMap::new()),
            state: RwLock::new(RegistryState::Uninitialized),
            status,
            lifecycle: Mutex::new(()),
        }
    }

    /// Create a registry that connects over the rmcp transports
    pub fn with_transports(source: Arc<dyn ConfigSource>) -> Self {
        Self::new(source, Arc::new(TransportFactory::new()))
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Read the configuration and connect to every server.
    ///
    /// Sessions from an earlier initialization are closed first. An empty
    /// configuration is not an error: the registry ends up empty with an
    /// error status.
    pub async fn initialize(&self) -> McpResult<()> {
        self.rebuild(RegistryState::Initializing).await
    }

    /// Tear down and rebuild from a fresh read of the configuration
    pub async fn reconnect(&self) -> McpResult<()> {
        info!("Reconnecting MCP servers");
        self.rebuild(RegistryState::Reconnecting).await
    }

    /// Initialize, retrying failed attempts with backoff
    pub async fn initialize_with_retry(&self, backoff: BackoffPolicy) -> McpResult<()> {
        let mut attempt = 0;
        loop {
            match self.initialize().await {
                Ok(()) => return Ok(()),
                Err(McpError::Disposed) => return Err(McpError::Disposed),
                Err(e) => match backoff.delay_for(attempt) {
                    Some(delay) => {
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Initialization failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn rebuild(&self, phase: RegistryState) -> McpResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_disposed().await {
            return Err(McpError::Disposed);
        }

        *self.state.write().await = phase;
        self.status.send_replace(RegistryStatus::Initializing);

        self.close_all_sessions().await;
        self.clear().await;

        let configs = match self.source.server_configs() {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "Failed to load MCP server configuration");
                self.fail(e.to_string()).await;
                return Err(e);
            }
        };

        if configs.is_empty() {
            warn!("No MCP servers configured");
            self.fail("No servers configured").await;
            return Ok(());
        }

        info!(servers = configs.len(), "Initializing MCP servers");

        let mut failed = Vec::new();
        let mut last_error = None;
        for config in &configs {
            if let Err(e) = self.initialize_server(config).await {
                error!(server = %config.name, error = %e, "Failed to initialize MCP server");
                match self.policy {
                    FailurePolicy::FailFast => {
                        self.fail(e.to_string()).await;
                        return Err(e);
                    }
                    FailurePolicy::ContinueOnError => {
                        failed.push(config.name.clone());
                        last_error = Some(e);
                    }
                }
            }
        }

        let server_count = self.sessions.read().await.len();
        let tool_count = self.tools.read().await.len();

        if server_count == 0 {
            if let Some(e) = last_error {
                self.fail(format!("All {} servers failed to initialize", failed.len()))
                    .await;
                return Err(e);
            }
        }

        *self.state.write().await = RegistryState::Ready;
        self.status.send_replace(RegistryStatus::Ready {
            server_count,
            tool_count,
            failed_servers: failed,
        });
        info!(servers = server_count, tools = tool_count, "MCP tool registry ready");
        Ok(())
    }

    async fn initialize_server(&self, config: &ServerConfig) -> McpResult<()> {
        info!(server = %config.name, transport = %config.kind(), "Initializing MCP server");

        let session = self.factory.create_session(config)?;
        if let Err(e) = session.connect().await {
            if let Err(close_err) = session.close().await {
                debug!(server = %config.name, error = %close_err, "Cleanup after failed connect");
            }
            return Err(e);
        }

        let previous = self
            .sessions
            .write()
            .await
            .insert(config.name.clone(), session.clone());
        if let Some(previous) = previous {
            warn!(server = %config.name, "Duplicate server name, replacing earlier session");
            self.forget_server_tools(&config.name).await;
            close_quietly(previous).await;
        }

        if let Err(e) = self.discover_tools(&config.name, session.as_ref()).await {
            self.sessions.write().await.remove(&config.name);
            close_quietly(session).await;
            return Err(e);
        }

        Ok(())
    }

    /// List a session's tools and register them under `server_name`.
    ///
    /// A tool name already owned by another server is taken over by this
    /// one. Returns how many tools the server contributed.
    pub async fn discover_tools(&self, server_name: &str, session: &dyn McpSession) -> McpResult<usize> {
        let descriptors = session.list_tools().await?;

        let mut tools = self.tools.write().await;
        let mut tools_by_server = self.tools_by_server.write().await;
        let mut names: Vec<String> = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let tool = Tool::from_descriptor(descriptor, server_name);

            if let Some(existing) = tools.get(&tool.name) {
                if existing.owner_server != server_name {
                    warn!(
                        tool = %tool.name,
                        previous = %existing.owner_server,
                        server = %server_name,
                        "Tool name collision, last server wins"
                    );
                    if let Some(owned) = tools_by_server.get_mut(&existing.owner_server) {
                        owned.retain(|name| name != &tool.name);
                    }
                }
            }

            if !names.contains(&tool.name) {
                names.push(tool.name.clone());
            }
            tools.insert(tool.name.clone(), tool);
        }

        let count = names.len();
        tools_by_server.insert(server_name.to_string(), names);
        info!(server = %server_name, tools = count, "Discovered tools");
        Ok(count)
    }

    /// Every registered tool, sorted by name
    pub async fn get_available_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.read().await.values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn has_tools(&self) -> bool {
        !self.tools.read().await.is_empty()
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn server_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Names of servers with a live session, sorted
    pub async fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tools a server contributed, in listing order
    pub async fn tools_for_server(&self, server_name: &str) -> Vec<Tool> {
        let tools = self.tools.read().await;
        let tools_by_server = self.tools_by_server.read().await;

        tools_by_server
            .get(server_name)
            .map(|names| names.iter().filter_map(|n| tools.get(n).cloned()).collect())
            .unwrap_or_default()
    }

    /// Call a tool by name.
    ///
    /// Never fails: every error comes back as an unsuccessful
    /// [`ToolCallResult`] carrying the message and its kind.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolCallResult {
        match self.dispatch(name, arguments).await {
            Ok(output) => ToolCallResult::success(output.into_value()),
            Err(e) => {
                warn!(tool = %name, kind = %e.kind(), error = %e, "Tool call failed");
                ToolCallResult::failure(&e)
            }
        }
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> McpResult<CallOutput> {
        let session = self.route(name).await?;
        let arguments = arguments_object(name, arguments)?;
        debug!(tool = %name, server = %session.server_name(), "Dispatching tool call");
        session.call_tool(name, arguments).await
    }

    /// Call a tool and forward each streamed chunk to `on_chunk`.
    ///
    /// Chunks holding content parts are split so the callback sees one value
    /// per part, text parts as plain strings.
    pub async fn call_tool_stream<F>(&self, name: &str, arguments: Value, on_chunk: F) -> McpResult<StreamHandle>
    where
        F: FnMut(Value) + Send + 'static,
    {
        let session = self.route(name).await?;
        let arguments = arguments_object(name, arguments)?;
        debug!(tool = %name, server = %session.server_name(), "Dispatching streaming tool call");

        let stream = session.call_tool_stream(name, arguments).await?;
        Ok(StreamHandle::spawn(name, stream, on_chunk))
    }

    async fn route(&self, name: &str) -> McpResult<Arc<dyn McpSession>> {
        if self.is_disposed().await {
            return Err(McpError::Disposed);
        }

        let owner = self
            .tools
            .read()
            .await
            .get(name)
            .map(|tool| tool.owner_server.clone())
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        self.sessions
            .read()
            .await
            .get(&owner)
            .cloned()
            .ok_or(McpError::ServerUnavailable(owner))
    }

    /// Close every session and clear the registry. Safe to call twice.
    ///
    /// Close failures are logged; every session still gets its close call.
    pub async fn dispose(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_disposed().await {
            return;
        }

        info!("Disposing MCP tool registry");
        self.close_all_sessions().await;
        self.clear().await;

        *self.state.write().await = RegistryState::Disposed;
        self.status.send_replace(RegistryStatus::Error {
            message: McpError::Disposed.to_string(),
        });
    }

    pub async fn state(&self) -> RegistryState {
        self.state.read().await.clone()
    }

    pub fn status(&self) -> RegistryStatus {
        self.status.borrow().clone()
    }

    pub fn status_text(&self) -> String {
        self.status.borrow().text()
    }

    /// Receive every status change from now on
    pub fn subscribe_status(&self) -> watch::Receiver<RegistryStatus> {
        self.status.subscribe()
    }

    async fn is_disposed(&self) -> bool {
        *self.state.read().await == RegistryState::Disposed
    }

    async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        *self.state.write().await = RegistryState::Error(message.clone());
        self.status.send_replace(RegistryStatus::Error { message });
    }

    async fn close_all_sessions(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (name, session) in sessions {
            if let Err(e) = session.close().await {
                warn!(server = %name, error = %e, "Failed to close MCP session");
            }
        }
    }

    async fn forget_server_tools(&self, server_name: &str) {
        let mut tools = self.tools.write().await;
        let mut tools_by_server = self.tools_by_server.write().await;
        if let Some(names) = tools_by_server.remove(server_name) {
            for name in names {
                tools.remove(&name);
            }
        }
    }

    async fn clear(&self) {
        self.sessions.write().await.clear();
        self.tools.write().await.clear();
        self.tools_by_server.write().await.clear();
    }
}

async fn close_quietly(session: Arc<dyn McpSession>) {
    if let Err(e) = session.close().await {
        warn!(server = %session.server_name(), error = %e, "Failed to close MCP session");
    }
}

/// Objects pass through, `null` means no arguments, anything else is rejected
fn arguments_object(tool: &str, arguments: Value) -> McpResult<JsonObject> {
    match arguments {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonObject::new()),
        other => Err(McpError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("expected a JSON object, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
