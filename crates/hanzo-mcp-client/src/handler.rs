//! Client-side notification handling
//!
//! Servers report streamed output through progress notifications keyed by
//! the progress token rmcp attaches to each request. The handler routes each
//! notification to the channel registered for its token.

use rmcp::model::{LoggingMessageNotificationParam, ProgressNotificationParam, ProgressToken};
use rmcp::service::NotificationContext;
use rmcp::{ClientHandler, RoleClient};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

type Subscribers = HashMap<String, mpsc::UnboundedSender<Value>>;

/// Per-session rmcp handler
#[derive(Clone)]
pub(crate) struct SessionHandler {
    server: Arc<str>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl SessionHandler {
    pub(crate) fn new(server: &str) -> Self {
        Self {
            server: Arc::from(server),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start receiving progress for a token
    pub(crate) async fn subscribe(&self, key: String) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.insert(key, tx);
        rx
    }

    pub(crate) async fn unsubscribe(&self, key: &str) {
        self.subscribers.lock().await.remove(key);
    }

    #[cfg(test)]
    pub(crate) async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

/// Stable map key for a progress token, whether numeric or string
pub(crate) fn progress_key(token: &ProgressToken) -> String {
    serde_json::to_string(token).unwrap_or_default()
}

impl ClientHandler for SessionHandler {
    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let key = progress_key(&params.progress_token);
        let subscribers = self.subscribers.lock().await;
        let Some(tx) = subscribers.get(&key) else {
            debug!(server = %self.server, token = %key, "Progress for unknown request");
            return;
        };

        match serde_json::to_value(&params) {
            Ok(chunk) => {
                if tx.send(chunk).is_err() {
                    debug!(server = %self.server, token = %key, "Progress receiver dropped");
                }
            }
            Err(e) => warn!(server = %self.server, error = %e, "Unserializable progress notification"),
        }
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(
            server = %self.server,
            level = ?params.level,
            logger = ?params.logger,
            data = %params.data,
            "Server log"
        );
    }
}
