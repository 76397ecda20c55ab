//! Completion handles for non-blocking device commands.
//!
//! Every `start`/`complete` on a flyable device returns as soon as the
//! command has been *issued*. What the hardware does afterwards is observed
//! through a [`Status`]: the caller decides whether to await it now, later,
//! or only poll it. Awaiting is how a caller fences on physical completion.
//!
//! ```rust,ignore
//! let status = trajectory.start().await?;   // issued, motion proceeds
//! // ... issue more commands ...
//! status.wait().await?;                     // fence on the motion profile
//! ```

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;

/// Handle resolving once a device action has physically finished.
#[derive(Debug)]
pub struct Status {
    inner: StatusInner,
}

#[derive(Debug)]
enum StatusInner {
    Finished(Option<String>),
    Pending(oneshot::Receiver<Result<()>>),
}

/// Resolves the paired [`Status`].
#[derive(Debug)]
pub struct StatusCompleter {
    tx: oneshot::Sender<Result<()>>,
}

impl Status {
    /// A status that is already successfully done.
    pub fn done() -> Self {
        Self {
            inner: StatusInner::Finished(None),
        }
    }

    /// A status that is already failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            inner: StatusInner::Finished(Some(reason.into())),
        }
    }

    /// A pending status plus the completer that resolves it.
    pub fn pending() -> (Self, StatusCompleter) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: StatusInner::Pending(rx),
            },
            StatusCompleter { tx },
        )
    }

    /// Non-blocking check. A dropped completer counts as done (with error on `wait`).
    pub fn is_done(&mut self) -> bool {
        match &mut self.inner {
            StatusInner::Finished(_) => true,
            StatusInner::Pending(rx) => match rx.try_recv() {
                Ok(result) => {
                    self.inner = StatusInner::Finished(result.err().map(|e| format!("{e:#}")));
                    true
                }
                Err(oneshot::error::TryRecvError::Empty) => false,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.inner = StatusInner::Finished(Some(
                        "device dropped the command before finishing".to_string(),
                    ));
                    true
                }
            },
        }
    }

    /// Waits for the action to finish, surfacing its failure.
    pub async fn wait(self) -> Result<()> {
        match self.inner {
            StatusInner::Finished(None) => Ok(()),
            StatusInner::Finished(Some(reason)) => Err(anyhow!(reason)),
            StatusInner::Pending(rx) => rx
                .await
                .map_err(|_| anyhow!("device dropped the command before finishing"))?,
        }
    }
}

impl StatusCompleter {
    /// Resolves the status. A status nobody awaits is not an error.
    pub fn finish(self, result: Result<()>) {
        let _ = self.tx.send(result);
    }
}
