//! Integration tests for the tool registry
//! Sessions are in-memory fakes; configuration comes from static or mocked sources

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::future::AbortHandle;
use futures::StreamExt;
use hanzo_mcp_client::{FailurePolicy, RegistryState, RegistryStatus, ToolRegistry};
use hanzo_mcp_core::{
    validate_all, BackoffPolicy, CallOutput, ConfigSource, EnvDefaults, ErrorKind, JsonObject,
    McpError, McpResult, McpSession, ServerConfig, SessionFactory, StaticConfigSource,
    ToolDescriptor, ToolStream,
};
use mockall::mock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[derive(Clone)]
enum Reply {
    Value(Value),
    Fail(String),
}

/// Scripted behaviour of one fake server
#[derive(Default)]
struct FakeServer {
    tools: Vec<ToolDescriptor>,
    replies: HashMap<String, Reply>,
    stream: Vec<Value>,
    stream_error: Option<String>,
    /// Chunks pushed by the test while the call runs; replaces `stream`
    live_stream: Mutex<Option<mpsc::UnboundedReceiver<McpResult<Value>>>>,
    list_fails: bool,
    connect_failures: AtomicUsize,
    fail_close: bool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<(String, JsonObject)>>,
}

impl FakeServer {
    fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|n| ToolDescriptor::new(*n)).collect(),
            ..Default::default()
        }
    }

    fn reply(mut self, tool: &str, reply: Reply) -> Self {
        self.replies.insert(tool.to_string(), reply);
        self
    }

    fn failing_connects(self, times: usize) -> Self {
        self.connect_failures.store(times, Ordering::SeqCst);
        self
    }

    fn failing_listing(mut self) -> Self {
        self.list_fails = true;
        self
    }

    fn live(self) -> (Self, mpsc::UnboundedSender<McpResult<Value>>) {
        let (tx, rx) = mpsc::unbounded();
        *self.live_stream.lock().unwrap() = Some(rx);
        (self, tx)
    }
}

struct FakeSession {
    name: String,
    server: Arc<FakeServer>,
}

#[async_trait]
impl McpSession for FakeSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> McpResult<()> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.server.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.server.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(McpError::connection(&self.name, "connection refused"));
        }
        Ok(())
    }

    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        if self.server.list_fails {
            return Err(McpError::connection(&self.name, "tools/list failed"));
        }
        Ok(self.server.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> McpResult<CallOutput> {
        self.server
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        match self.server.replies.get(name) {
            Some(Reply::Value(value)) => Ok(CallOutput::from_value(value.clone())),
            Some(Reply::Fail(message)) => Err(McpError::execution(name, message.clone())),
            None => Ok(CallOutput::Raw(Value::Null)),
        }
    }

    async fn call_tool_stream(&self, name: &str, _arguments: JsonObject) -> McpResult<ToolStream> {
        let (cancel, _registration) = AbortHandle::new_pair();
        if let Some(live) = self.server.live_stream.lock().unwrap().take() {
            return Ok(ToolStream {
                chunks: live.boxed(),
                cancel,
            });
        }

        let mut items: Vec<McpResult<Value>> = self.server.stream.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.server.stream_error {
            items.push(Err(McpError::execution(name, message.clone())));
        }

        Ok(ToolStream {
            chunks: futures::stream::iter(items).boxed(),
            cancel,
        })
    }

    async fn close(&self) -> McpResult<()> {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
        if self.server.fail_close {
            return Err(McpError::connection(&self.name, "close failed"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeFactory {
    servers: HashMap<String, Arc<FakeServer>>,
    created: Mutex<Vec<String>>,
}

impl FakeFactory {
    fn server(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(name.to_string(), Arc::new(server));
        self
    }

    fn get(&self, name: &str) -> Arc<FakeServer> {
        self.servers[name].clone()
    }

    fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

impl SessionFactory for FakeFactory {
    fn create_session(&self, config: &ServerConfig) -> McpResult<Arc<dyn McpSession>> {
        self.created.lock().unwrap().push(config.name.clone());
        let server = self.servers.get(&config.name).cloned().ok_or_else(|| {
            McpError::configuration(format!("no transport for server '{}'", config.name))
        })?;
        Ok(Arc::new(FakeSession {
            name: config.name.clone(),
            server,
        }))
    }
}

mock! {
    pub Source {}

    impl ConfigSource for Source {
        fn server_configs(&self) -> McpResult<Vec<ServerConfig>>;
    }
}

fn configs(names: &[&str]) -> Vec<ServerConfig> {
    names
        .iter()
        .map(|name| ServerConfig::stream_http(*name, format!("localhost:9000/{}", name)))
        .collect()
}

fn registry(names: &[&str], factory: Arc<FakeFactory>) -> ToolRegistry {
    ToolRegistry::new(Arc::new(StaticConfigSource::new(configs(names))), factory)
}

#[tokio::test]
async fn test_initialize_registers_all_tools() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("db", FakeServer::with_tools(&["list_schemas", "run_query"]))
            .server("fs", FakeServer::with_tools(&["read_file"])),
    );
    let registry = registry(&["db", "fs"], factory);

    assert_ok!(registry.initialize().await);

    assert!(registry.has_tools().await);
    assert_eq!(registry.tool_count().await, 3);
    assert_eq!(registry.server_names().await, vec!["db", "fs"]);

    let names: Vec<String> = registry
        .get_available_tools()
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["list_schemas", "read_file", "run_query"]);

    assert_eq!(registry.state().await, RegistryState::Ready);
    assert_eq!(
        registry.status(),
        RegistryStatus::Ready {
            server_count: 2,
            tool_count: 3,
            failed_servers: vec![],
        }
    );
}

#[tokio::test]
async fn test_tool_collision_last_server_wins() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("a", FakeServer::with_tools(&["x", "only_a"]))
            .server("b", FakeServer::with_tools(&["x"])),
    );
    let registry = registry(&["a", "b"], factory.clone());
    registry.initialize().await.unwrap();

    assert_eq!(registry.tool_count().await, 2);
    assert_eq!(registry.get_tool("x").await.unwrap().owner_server, "b");

    let a_tools: Vec<String> = registry
        .tools_for_server("a")
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(a_tools, vec!["only_a"]);

    registry.call_tool("x", json!({})).await;
    assert!(factory.get("a").calls.lock().unwrap().is_empty());
    assert_eq!(factory.get("b").calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let factory = Arc::new(FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"])));
    let registry = registry(&["db"], factory);
    registry.initialize().await.unwrap();

    let result = registry.call_tool("nonexistent", json!({})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Tool 'nonexistent' not found"));
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_tool_without_session_is_unavailable() {
    let factory = Arc::new(FakeFactory::default().server("ghost", FakeServer::with_tools(&["haunt"])));
    let registry = registry(&[], factory.clone());

    let orphan = factory
        .create_session(&ServerConfig::stream_http("ghost", "localhost:1"))
        .unwrap();
    let count = registry.discover_tools("ghost", orphan.as_ref()).await.unwrap();
    assert_eq!(count, 1);

    let result = registry.call_tool("haunt", json!({})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Server 'ghost' not available"));
    assert_eq!(result.error_kind, Some(ErrorKind::Unavailable));
}

#[tokio::test]
async fn test_text_results_are_unwrapped() {
    let server = FakeServer::with_tools(&["answer", "count", "object"])
        .reply("answer", Reply::Value(json!([{"type": "text", "text": "42"}])))
        .reply("count", Reply::Value(json!(7)))
        .reply("object", Reply::Value(json!({"rows": [1, 2]})));
    let factory = Arc::new(FakeFactory::default().server("calc", server));
    let registry = registry(&["calc"], factory);
    registry.initialize().await.unwrap();

    let result = registry.call_tool("answer", Value::Null).await;
    assert!(result.success);
    assert_eq!(result.data, Some(json!("42")));

    let result = registry.call_tool("count", json!({})).await;
    assert_eq!(result.data, Some(json!(7)));

    let result = registry.call_tool("object", json!({})).await;
    assert_eq!(result.data, Some(json!({"rows": [1, 2]})));
}

#[tokio::test]
async fn test_remote_failure_becomes_result() {
    let server = FakeServer::with_tools(&["run_query"])
        .reply("run_query", Reply::Fail("syntax error near SELEC".to_string()));
    let factory = Arc::new(FakeFactory::default().server("db", server));
    let registry = registry(&["db"], factory);
    registry.initialize().await.unwrap();

    let result = registry.call_tool("run_query", json!({"sql": "SELEC"})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("syntax error near SELEC"));
    assert_eq!(result.error_kind, Some(ErrorKind::Execution));
}

#[tokio::test]
async fn test_non_object_arguments_rejected() {
    let factory = Arc::new(FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"])));
    let registry = registry(&["db"], factory.clone());
    registry.initialize().await.unwrap();

    let result = registry.call_tool("run_query", json!("SELECT 1")).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Execution));
    assert!(factory.get("db").calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_chunks_forwarded_in_order() {
    let mut server = FakeServer::with_tools(&["tail"]);
    server.stream = vec![
        json!({"content": [{"type": "text", "text": "a"}]}),
        json!({"content": [{"type": "text", "text": "b"}]}),
        json!("raw"),
    ];
    let factory = Arc::new(FakeFactory::default().server("logs", server));
    let registry = registry(&["logs"], factory);
    registry.initialize().await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handle = registry
        .call_tool_stream("tail", json!({}), move |chunk| sink.lock().unwrap().push(chunk))
        .await
        .unwrap();

    handle.finished().await.unwrap();
    assert_eq!(*received.lock().unwrap(), vec![json!("a"), json!("b"), json!("raw")]);
}

#[tokio::test]
async fn test_stream_error_after_chunks() {
    let mut server = FakeServer::with_tools(&["tail"]);
    server.stream = vec![json!("first")];
    server.stream_error = Some("pipe closed".to_string());
    let factory = Arc::new(FakeFactory::default().server("logs", server));
    let registry = registry(&["logs"], factory);
    registry.initialize().await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handle = registry
        .call_tool_stream("tail", Value::Null, move |chunk| sink.lock().unwrap().push(chunk))
        .await
        .unwrap();

    let err = handle.finished().await.unwrap_err();
    assert_eq!(err.to_string(), "pipe closed");
    assert_eq!(*received.lock().unwrap(), vec![json!("first")]);
}

#[tokio::test]
async fn test_stream_unknown_tool() {
    let factory = Arc::new(FakeFactory::default().server("logs", FakeServer::with_tools(&["tail"])));
    let registry = registry(&["logs"], factory);
    registry.initialize().await.unwrap();

    let err = registry
        .call_tool_stream("head", json!({}), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_stream_cancel_stops_forwarding() {
    let mut server = FakeServer::with_tools(&["tail"]);
    server.stream = vec![json!("never")];
    let factory = Arc::new(FakeFactory::default().server("logs", server));
    let registry = registry(&["logs"], factory);
    registry.initialize().await.unwrap();

    let handle = registry
        .call_tool_stream("tail", json!({}), |_| {})
        .await
        .unwrap();
    handle.cancel();

    assert!(handle.is_cancelled());
    assert!(handle.finished().await.is_ok());
}

#[tokio::test]
async fn test_stream_cancel_drops_later_chunks() {
    let (server, tx) = FakeServer::with_tools(&["tail"]).live();
    let factory = Arc::new(FakeFactory::default().server("logs", server));
    let registry = registry(&["logs"], factory);
    registry.initialize().await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handle = registry
        .call_tool_stream("tail", json!({}), move |chunk| sink.lock().unwrap().push(chunk))
        .await
        .unwrap();

    tx.unbounded_send(Ok(json!("before"))).unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let seen = received.lock().unwrap().len();
            if seen > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.cancel();
    // The forwarder may already have dropped its receiver
    let _ = tx.unbounded_send(Ok(json!("after")));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(handle.is_cancelled());
    assert_ok!(handle.finished().await);
    assert_eq!(*received.lock().unwrap(), vec![json!("before")]);
}

#[tokio::test]
async fn test_duplicate_server_name_replaces_session() {
    let factory = Arc::new(FakeFactory::default().server("a", FakeServer::with_tools(&["x", "y"])));
    let registry = registry(&["a", "a"], factory.clone());

    registry.initialize().await.unwrap();

    assert_eq!(factory.created(), vec!["a", "a"]);
    assert_eq!(registry.server_count().await, 1);
    assert_eq!(factory.get("a").connects.load(Ordering::SeqCst), 2);
    // Only the first session is closed; the second one stays live
    assert_eq!(factory.get("a").closes.load(Ordering::SeqCst), 1);

    assert_eq!(registry.tool_count().await, 2);
    let owned: Vec<String> = registry
        .tools_for_server("a")
        .await
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(owned, vec!["x", "y"]);
    assert!(matches!(
        registry.status(),
        RegistryStatus::Ready { server_count: 1, tool_count: 2, .. }
    ));
}

#[tokio::test]
async fn test_failed_discovery_drops_session() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("a", FakeServer::with_tools(&["from_a"]))
            .server("bad", FakeServer::with_tools(&["never"]).failing_listing())
            .server("c", FakeServer::with_tools(&["from_c"])),
    );
    let registry = registry(&["a", "bad", "c"], factory.clone());

    let err = registry.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    assert_eq!(registry.server_names().await, vec!["a"]);
    assert_eq!(factory.get("bad").connects.load(Ordering::SeqCst), 1);
    assert_eq!(factory.get("bad").closes.load(Ordering::SeqCst), 1);
    assert_eq!(factory.created(), vec!["a", "bad"]);
    assert!(registry.get_tool("never").await.is_none());
    assert!(registry.get_tool("from_c").await.is_none());
    assert!(registry.get_tool("from_a").await.is_some());
}

#[tokio::test]
async fn test_reconnect_rereads_config() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("db", FakeServer::with_tools(&["list_schemas", "run_query"]))
            .server("fs", FakeServer::with_tools(&["read_file"])),
    );

    let mut source = MockSource::new();
    source
        .expect_server_configs()
        .times(3)
        .returning(|| Ok(configs(&["db", "fs"])));

    let registry = ToolRegistry::new(Arc::new(source), factory.clone());
    registry.initialize().await.unwrap();
    let before = registry.get_available_tools().await;

    registry.reconnect().await.unwrap();
    registry.reconnect().await.unwrap();

    assert_eq!(registry.get_available_tools().await, before);
    assert_eq!(registry.state().await, RegistryState::Ready);

    // Each rebuild closes the previous generation of sessions
    assert_eq!(factory.get("db").connects.load(Ordering::SeqCst), 3);
    assert_eq!(factory.get("db").closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reconnect_picks_up_config_changes() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("db", FakeServer::with_tools(&["run_query"]))
            .server("fs", FakeServer::with_tools(&["read_file"])),
    );

    let mut source = MockSource::new();
    let mut seq = mockall::Sequence::new();
    source
        .expect_server_configs()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(configs(&["db"])));
    source
        .expect_server_configs()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(configs(&["fs"])));

    let registry = ToolRegistry::new(Arc::new(source), factory);
    registry.initialize().await.unwrap();
    assert!(registry.get_tool("run_query").await.is_some());

    registry.reconnect().await.unwrap();
    assert!(registry.get_tool("run_query").await.is_none());
    assert!(registry.get_tool("read_file").await.is_some());
}

#[tokio::test]
async fn test_config_error_sets_error_state() {
    let mut source = MockSource::new();
    source
        .expect_server_configs()
        .returning(|| Err(McpError::configuration("unreadable config file")));

    let registry = ToolRegistry::new(Arc::new(source), Arc::new(FakeFactory::default()));
    let err = registry.initialize().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(registry.state().await, RegistryState::Error(_)));
    assert!(!registry.has_tools().await);
}

#[tokio::test]
async fn test_empty_config_is_not_an_error() {
    let registry = registry(&[], Arc::new(FakeFactory::default()));

    registry.initialize().await.unwrap();

    assert!(!registry.has_tools().await);
    assert_eq!(
        registry.state().await,
        RegistryState::Error("No servers configured".to_string())
    );
    assert_eq!(registry.status_text(), "MCP error: No servers configured");
}

#[tokio::test]
async fn test_fail_fast_keeps_earlier_servers() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("a", FakeServer::with_tools(&["from_a"]))
            .server("bad", FakeServer::with_tools(&["never"]).failing_connects(1))
            .server("c", FakeServer::with_tools(&["from_c"])),
    );
    let registry = registry(&["a", "bad", "c"], factory.clone());

    let err = registry.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("bad"));

    assert!(registry.get_tool("from_a").await.is_some());
    assert!(registry.get_tool("from_c").await.is_none());
    assert_eq!(factory.created(), vec!["a", "bad"]);
    assert!(matches!(registry.status(), RegistryStatus::Error { .. }));
}

#[tokio::test]
async fn test_continue_on_error_skips_failed_servers() {
    let factory = Arc::new(
        FakeFactory::default()
            .server("a", FakeServer::with_tools(&["from_a"]))
            .server("bad", FakeServer::with_tools(&["never"]).failing_connects(1))
            .server("c", FakeServer::with_tools(&["from_c"])),
    );
    let registry =
        registry(&["a", "bad", "c"], factory.clone()).with_failure_policy(FailurePolicy::ContinueOnError);

    registry.initialize().await.unwrap();

    assert_eq!(registry.tool_count().await, 2);
    assert_eq!(registry.server_names().await, vec!["a", "c"]);
    assert_eq!(
        registry.status(),
        RegistryStatus::Ready {
            server_count: 2,
            tool_count: 2,
            failed_servers: vec!["bad".to_string()],
        }
    );
    // The failed session is still closed
    assert_eq!(factory.get("bad").closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_continue_on_error_all_failed() {
    let factory = Arc::new(
        FakeFactory::default().server("bad", FakeServer::with_tools(&["never"]).failing_connects(1)),
    );
    let registry = registry(&["bad"], factory).with_failure_policy(FailurePolicy::ContinueOnError);

    assert_err!(registry.initialize().await);
    assert_eq!(
        registry.state().await,
        RegistryState::Error("All 1 servers failed to initialize".to_string())
    );
}

#[tokio::test]
async fn test_initialize_with_retry_recovers() {
    let factory = Arc::new(
        FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"]).failing_connects(2)),
    );
    let registry = registry(&["db"], factory.clone());

    let backoff = BackoffPolicy {
        initial_delay_ms: 1,
        factor: 1.0,
        max_delay_ms: 1,
        max_retries: 3,
    };
    registry.initialize_with_retry(backoff).await.unwrap();

    assert!(registry.has_tools().await);
    assert_eq!(factory.get("db").connects.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_initialize_with_retry_gives_up() {
    let factory = Arc::new(
        FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"]).failing_connects(10)),
    );
    let registry = registry(&["db"], factory.clone());

    let backoff = BackoffPolicy {
        initial_delay_ms: 1,
        factor: 1.0,
        max_delay_ms: 1,
        max_retries: 2,
    };
    let err = registry.initialize_with_retry(backoff).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(factory.get("db").connects.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dispose_closes_everything() {
    let mut failing = FakeServer::with_tools(&["run_query"]);
    failing.fail_close = true;
    let factory = Arc::new(
        FakeFactory::default()
            .server("db", failing)
            .server("fs", FakeServer::with_tools(&["read_file"])),
    );
    let registry = registry(&["db", "fs"], factory.clone());
    registry.initialize().await.unwrap();

    registry.dispose().await;

    assert_eq!(factory.get("db").closes.load(Ordering::SeqCst), 1);
    assert_eq!(factory.get("fs").closes.load(Ordering::SeqCst), 1);
    assert!(!registry.has_tools().await);
    assert!(registry.get_available_tools().await.is_empty());
    assert_eq!(registry.server_count().await, 0);
    assert_eq!(registry.state().await, RegistryState::Disposed);

    // Second dispose is a no-op
    registry.dispose().await;
    assert_eq!(factory.get("fs").closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_use_after_dispose() {
    let factory = Arc::new(FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"])));
    let registry = registry(&["db"], factory);
    registry.initialize().await.unwrap();
    registry.dispose().await;

    assert!(matches!(registry.initialize().await, Err(McpError::Disposed)));
    assert!(matches!(registry.reconnect().await, Err(McpError::Disposed)));

    let result = registry.call_tool("run_query", json!({})).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Disposed));

    let err = registry
        .call_tool_stream("run_query", json!({}), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Disposed);
}

#[tokio::test]
async fn test_invalid_configs_are_dropped() {
    let env = EnvDefaults::default();
    let raws = vec![
        json!({"name": "db", "transport": "stream-http", "endpoint": "localhost:8931/mcp"}),
        json!({"name": "broken", "transport": "stream-http"}),
        json!({"transport": "subprocess", "command": "mcp-fs"}),
    ];
    let valid = validate_all(&raws, &env);
    assert_eq!(valid.len(), 1);

    let factory = Arc::new(FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"])));
    let registry = ToolRegistry::new(Arc::new(StaticConfigSource::new(valid)), factory.clone());
    registry.initialize().await.unwrap();

    assert_eq!(factory.created(), vec!["db"]);
    assert_eq!(registry.tool_count().await, 1);
}

#[tokio::test]
async fn test_status_subscription() {
    let factory = Arc::new(FakeFactory::default().server("db", FakeServer::with_tools(&["run_query"])));
    let registry = registry(&["db"], factory);
    let mut status = registry.subscribe_status();
    assert_eq!(*status.borrow(), RegistryStatus::Initializing);

    registry.initialize().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), status.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(status.borrow().is_ready());
    assert_eq!(registry.status_text(), "MCP: 1 server, 1 tool");
}

#[tokio::test]
async fn test_database_scenario() {
    let server = FakeServer {
        tools: vec![
            ToolDescriptor::new("list_schemas").with_description("List database schemas"),
            ToolDescriptor::new("run_query")
                .with_description("Run a SQL query")
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {"sql": {"type": "string"}},
                    "required": ["sql"]
                })),
        ],
        ..Default::default()
    }
    .reply("list_schemas", Reply::Value(json!(["public", "analytics"])))
    .reply(
        "run_query",
        Reply::Value(json!({"content": [{"type": "text", "text": "1 row"}]})),
    );
    let factory = Arc::new(FakeFactory::default().server("db", server));
    let registry = registry(&["db"], factory.clone());
    registry.initialize().await.unwrap();

    let tools = registry.get_available_tools().await;
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|t| t.owner_server == "db"));
    assert_eq!(tools[1].description, "Run a SQL query");

    let result = registry.call_tool("list_schemas", json!({})).await;
    assert!(result.success);
    assert_eq!(result.data, Some(json!(["public", "analytics"])));

    let result = registry.call_tool("run_query", json!({"sql": "SELECT 1"})).await;
    assert!(result.success);
    assert_eq!(result.data, Some(json!("1 row")));

    let calls = factory.get("db").calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, "run_query");
    assert_eq!(calls[1].1.get("sql"), Some(&json!("SELECT 1")));

    registry.dispose().await;
    assert!(!registry.has_tools().await);
}
