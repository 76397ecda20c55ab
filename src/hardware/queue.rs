//! Ordered per-device command queue.
//!
//! A device that accepts non-blocking commands still has to execute them in
//! the order they were issued: a line's `complete` may only read the buffer
//! after that line's `start` finished filling it, and the next line's `start`
//! may only begin after that. `CommandQueue` gives each simulated device a
//! worker task that drains submitted jobs strictly in FIFO order, so the
//! caller can fire commands back-to-back and rely on the queue for ordering.
//!
//! Must be created inside a Tokio runtime.

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use tokio::sync::mpsc;

use super::status::Status;

type Job = BoxFuture<'static, ()>;

/// FIFO worker executing one device's physical actions.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    device_id: String,
    tx: mpsc::UnboundedSender<Job>,
}

impl CommandQueue {
    /// Spawns the worker task for `device_id`.
    pub fn spawn(device_id: impl Into<String>) -> Self {
        let device_id = device_id.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker_id = device_id.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            tracing::trace!(device = %worker_id, "command queue closed");
        });
        Self { device_id, tx }
    }

    /// Enqueues `action`; the returned status resolves when it has run.
    pub fn submit<F>(&self, action: F) -> Status
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let (status, completer) = Status::pending();
        let job = async move {
            completer.finish(action.await);
        }
        .boxed();

        if self.tx.send(job).is_err() {
            return Status::failed(format!(
                "command queue for '{}' is closed",
                self.device_id
            ));
        }
        status
    }

    /// Resolves once every job submitted before this call has run.
    pub async fn drain(&self) -> Result<()> {
        self.submit(async { Ok(()) }).wait().await
    }
}
