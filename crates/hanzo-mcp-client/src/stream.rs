//! Forwarding of streamed tool output to a caller's callback

use futures::future::{AbortHandle, Abortable};
use futures::StreamExt;
use hanzo_mcp_core::{chunk_parts, McpError, McpResult, ToolStream};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Handle to a running streaming tool call
pub struct StreamHandle {
    tool: String,
    forwarder: AbortHandle,
    source: AbortHandle,
    task: JoinHandle<McpResult<()>>,
}

impl StreamHandle {
    pub(crate) fn spawn<F>(tool: &str, stream: ToolStream, mut on_chunk: F) -> Self
    where
        F: FnMut(Value) + Send + 'static,
    {
        let ToolStream {
            mut chunks,
            cancel: source,
        } = stream;
        let (forwarder, registration) = AbortHandle::new_pair();
        let name = tool.to_string();

        let task = tokio::spawn(async move {
            let forward = async {
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(value) => chunk_parts(value).into_iter().for_each(&mut on_chunk),
                        Err(e) => {
                            error!(tool = %name, error = %e, "Streaming tool call failed");
                            return Err(e);
                        }
                    }
                }
                Ok(())
            };

            match Abortable::new(forward, registration).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(tool = %name, "Streaming tool call cancelled");
                    Ok(())
                }
            }
        });

        Self {
            tool: tool.to_string(),
            forwarder,
            source,
            task,
        }
    }

    /// Stop forwarding chunks and cancel the underlying call
    pub fn cancel(&self) {
        self.forwarder.abort();
        self.source.abort();
    }

    /// Detached cancel function, usable after the handle moves
    pub fn canceller(&self) -> impl Fn() + Send + Sync + 'static {
        let forwarder = self.forwarder.clone();
        let source = self.source.clone();
        move || {
            forwarder.abort();
            source.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.forwarder.is_aborted()
    }

    /// Wait for the stream to end. Stream errors are returned here after
    /// being logged; a cancelled stream ends with `Ok`.
    pub async fn finished(self) -> McpResult<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(McpError::execution(&self.tool, e.to_string())),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("tool", &self.tool)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
