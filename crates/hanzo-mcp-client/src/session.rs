//! rmcp-backed session
//!
//! One [`RmcpSession`] owns the live connection to one server. Every
//! handshake and request is bounded by the server's configured timeout.

use crate::handler::{progress_key, SessionHandler};
use crate::stderr::StderrTail;
use crate::transport::{RmcpBackoff, TransportPlan};
use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable};
use futures::StreamExt;
use hanzo_mcp_core::{
    CallOutput, JsonObject, McpError, McpResult, McpSession, ServerConfig, ToolDescriptor,
    ToolStream, TransportKind,
};
use rmcp::model::{
    CallToolRequest, CallToolRequestParam, CancelledNotificationParam, ClientRequest,
    PaginatedRequestParam, ServerResult,
};
use rmcp::service::{Peer, PeerRequestOptions, RunningService};
use rmcp::transport::sse_client::SseClientConfig;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{SseClientTransport, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages followed for one server
const MAX_LIST_PAGES: usize = 64;

/// Time given to a failed child to flush stderr
const STDERR_SETTLE: Duration = Duration::from_millis(200);

type Service = RunningService<RoleClient, SessionHandler>;

/// Session over one of the rmcp client transports
pub struct RmcpSession {
    name: String,
    kind: TransportKind,
    timeout_ms: u64,
    plan: TransportPlan,
    handler: SessionHandler,
    service: RwLock<Option<Service>>,
    stderr: Mutex<Option<StderrTail>>,
}

impl RmcpSession {
    /// Create an unconnected session
    pub fn new(config: &ServerConfig, plan: TransportPlan) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind(),
            timeout_ms: config.timeout_ms,
            plan,
            handler: SessionHandler::new(&config.name),
            service: RwLock::new(None),
            stderr: Mutex::new(None),
        }
    }

    /// Transport plan this session connects with
    pub fn plan(&self) -> &TransportPlan {
        &self.plan
    }

    pub async fn is_connected(&self) -> bool {
        self.service.read().await.is_some()
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    async fn peer(&self) -> McpResult<Peer<RoleClient>> {
        self.service
            .read()
            .await
            .as_ref()
            .map(|service| service.peer().clone())
            .ok_or_else(|| McpError::ServerUnavailable(self.name.clone()))
    }

    async fn bounded<T, E, F>(
        &self,
        operation: &str,
        request: F,
        map_err: impl FnOnce(E) -> McpError,
    ) -> McpResult<T>
    where
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.timeout(), request).await {
            Ok(result) => result.map_err(map_err),
            Err(_) => Err(McpError::timeout(&self.name, operation, self.timeout_ms)),
        }
    }

    fn connection_error(&self, err: impl Display) -> McpError {
        McpError::connection(&self.name, err.to_string())
    }

    async fn establish(&self) -> McpResult<Service> {
        let handler = self.handler.clone();

        match &self.plan {
            TransportPlan::StreamHttp {
                url,
                client,
                backoff,
                ..
            } => {
                let mut config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
                config.retry_config = Arc::new(RmcpBackoff(*backoff));
                let transport = StreamableHttpClientTransport::with_client(client.clone(), config);
                handler
                    .serve(transport)
                    .await
                    .map_err(|e| self.connection_error(e))
            }
            TransportPlan::PushHttp {
                url,
                client,
                backoff,
            } => {
                let mut config = SseClientConfig::default();
                config.sse_endpoint = url.as_str().into();
                config.retry_policy = Arc::new(RmcpBackoff(*backoff));
                let transport = SseClientTransport::start_with_client(client.clone(), config)
                    .await
                    .map_err(|e| self.connection_error(e))?;
                handler
                    .serve(transport)
                    .await
                    .map_err(|e| self.connection_error(e))
            }
            TransportPlan::Subprocess {
                command,
                args,
                env,
                cwd,
            } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args).envs(env);
                if let Some(dir) = cwd {
                    cmd.current_dir(dir);
                }

                let (transport, stderr) = TokioChildProcess::builder(cmd)
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(|e| {
                        self.connection_error(format!("failed to spawn '{}': {}", command, e))
                    })?;
                if let Some(stderr) = stderr {
                    *self.stderr.lock().await = Some(StderrTail::spawn(&self.name, stderr));
                }

                handler
                    .serve(transport)
                    .await
                    .map_err(|e| self.connection_error(e))
            }
        }
    }

    async fn with_stderr_tail(&self, err: McpError) -> McpError {
        let mut guard = self.stderr.lock().await;
        let Some(tail) = guard.as_mut() else {
            return err;
        };

        let lines = tail.settle(STDERR_SETTLE).await;
        match err {
            McpError::Connection { server, message } if !lines.is_empty() => McpError::Connection {
                server,
                message: format!("{}\nstderr:\n{}", message, lines.join("\n")),
            },
            other => other,
        }
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> McpResult<()> {
        let mut guard = self.service.write().await;
        if guard.is_some() {
            return Ok(());
        }

        info!(server = %self.name, transport = %self.kind, "Connecting to MCP server");

        let service = match tokio::time::timeout(self.timeout(), self.establish()).await {
            Ok(Ok(service)) => service,
            Ok(Err(e)) => return Err(self.with_stderr_tail(e).await),
            Err(_) => {
                let err = McpError::timeout(&self.name, "Handshake", self.timeout_ms);
                return Err(self.with_stderr_tail(err).await);
            }
        };

        if let Some(info) = service.peer_info() {
            info!(
                server = %self.name,
                remote = %info.server_info.name,
                version = %info.server_info.version,
                "Connected to MCP server"
            );
        }

        *guard = Some(service);
        Ok(())
    }

    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let peer = self.peer().await?;
        let mut descriptors = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let request = Some(PaginatedRequestParam {
                cursor: cursor.take(),
            });
            let page = self
                .bounded("tools/list", peer.list_tools(request), |e| {
                    self.connection_error(format!("tools/list failed: {}", e))
                })
                .await?;

            let listing = serde_json::to_value(&page)?;
            descriptors.extend(ToolDescriptor::from_listing(&self.name, &listing));

            cursor = listing
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(descriptors);
            }
        }

        warn!(server = %self.name, pages = MAX_LIST_PAGES, "Tool listing truncated");
        Ok(descriptors)
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> McpResult<CallOutput> {
        let peer = self.peer().await?;
        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments),
        };

        debug!(server = %self.name, tool = %name, "Calling tool");
        let result = self
            .bounded("tools/call", peer.call_tool(params), |e| {
                McpError::execution(name, e.to_string())
            })
            .await?;

        CallOutput::from_envelope(name, serde_json::to_value(&result)?)
    }

    async fn call_tool_stream(&self, name: &str, arguments: JsonObject) -> McpResult<ToolStream> {
        let peer = self.peer().await?;
        let request = ClientRequest::CallToolRequest(CallToolRequest {
            method: Default::default(),
            params: CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            },
            extensions: Default::default(),
        });

        debug!(server = %self.name, tool = %name, "Calling tool with streaming");
        let handle = peer
            .send_cancellable_request(request, PeerRequestOptions::no_options())
            .await
            .map_err(|e| McpError::execution(name, e.to_string()))?;

        let token = progress_key(&handle.progress_token);
        let request_id = handle.id.clone();
        let mut progress = self.handler.subscribe(token.clone()).await;

        let (tx, rx) = mpsc::unbounded_channel::<McpResult<Value>>();
        let (cancel, registration) = AbortHandle::new_pair();
        let tool = name.to_string();
        let server = self.name.clone();
        let idle = self.timeout();
        let timeout_ms = self.timeout_ms;

        let pump = async move {
            let response = handle.await_response();
            tokio::pin!(response);
            let deadline = tokio::time::sleep(idle);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    Some(chunk) = progress.recv() => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + idle);
                        if tx.send(Ok(chunk)).is_err() {
                            break;
                        }
                    }
                    result = &mut response => {
                        let item = match result {
                            Ok(ServerResult::CallToolResult(result)) => {
                                serde_json::to_value(&result)
                                    .map_err(McpError::from)
                                    .and_then(|envelope| {
                                        CallOutput::from_envelope(&tool, envelope.clone())
                                            .map(|_| envelope)
                                    })
                            }
                            Ok(other) => Err(McpError::execution(
                                &tool,
                                format!("unexpected response: {:?}", other),
                            )),
                            Err(e) => Err(McpError::execution(&tool, e.to_string())),
                        };
                        deliver(&tx, item, &server, &tool);
                        break;
                    }
                    _ = &mut deadline => {
                        let expired = Err(McpError::timeout(&server, "tools/call", timeout_ms));
                        deliver(&tx, expired, &server, &tool);
                        break;
                    }
                }
            }
        };

        let handler = self.handler.clone();
        let stream_server = self.name.clone();
        tokio::spawn(async move {
            let cancelled = Abortable::new(pump, registration).await.is_err();
            handler.unsubscribe(&token).await;

            if cancelled {
                debug!(server = %stream_server, "Streaming call cancelled");
                let notice = CancelledNotificationParam {
                    request_id,
                    reason: Some("cancelled by client".to_string()),
                };
                if let Err(e) = peer.notify_cancelled(notice).await {
                    warn!(server = %stream_server, error = %e, "Failed to send cancellation");
                }
            }
        });

        let chunks = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok(ToolStream { chunks, cancel })
    }

    async fn close(&self) -> McpResult<()> {
        if let Some(tail) = self.stderr.lock().await.take() {
            tail.stop();
        }

        let Some(service) = self.service.write().await.take() else {
            return Ok(());
        };

        info!(server = %self.name, "Closing MCP session");
        service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| self.connection_error(format!("error while closing: {}", e)))
    }
}

/// Hand the terminal item of a streaming call to its reader. Returns
/// false when the reader is already gone.
fn deliver(
    tx: &mpsc::UnboundedSender<McpResult<Value>>,
    item: McpResult<Value>,
    server: &str,
    tool: &str,
) -> bool {
    match tx.send(item) {
        Ok(()) => true,
        Err(_) => {
            debug!(server = %server, tool = %tool, "Stream receiver dropped before final result");
            false
        }
    }
}
