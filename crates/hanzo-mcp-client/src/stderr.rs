//! Subprocess stderr capture

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Lines kept for handshake error reports
pub const STDERR_TAIL_LINES: usize = 20;

/// Logs a child's stderr and remembers its last lines
pub(crate) struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    task: JoinHandle<()>,
}

impl StderrTail {
    pub(crate) fn spawn(server: &str, stderr: ChildStderr) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let buffer = lines.clone();
        let server = server.to_string();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(server = %server, "stderr: {}", line);
                let mut buffer = buffer.lock().await;
                if buffer.len() == STDERR_TAIL_LINES {
                    buffer.pop_front();
                }
                buffer.push_back(line);
            }
        });

        Self { lines, task }
    }

    /// Wait briefly for the child to finish writing, then return the tail
    pub(crate) async fn settle(&mut self, wait: Duration) -> Vec<String> {
        if !self.task.is_finished() {
            let _ = tokio::time::timeout(wait, &mut self.task).await;
        }
        self.lines.lock().await.iter().cloned().collect()
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}
