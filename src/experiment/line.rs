//! Line driver: one raster line, issued without waiting on hardware.
//!
//! Issue order within a line is fixed:
//!
//! 1. trajectory `start`
//! 2. `start` on every per-line channel
//! 3. trajectory `complete`
//! 4. `complete` on every per-line channel
//!
//! Channels must be armed within the trajectory's ramp-up window, which the
//! back-to-back issue guarantees. [`LineDriver::run_line`] returns as soon as
//! all commands are issued; the physical line is observed through the
//! returned [`LineStatus`].

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, instrument};

use crate::error::{AppResult, DeviceContext};
use crate::hardware::capabilities::TrajectoryGenerator;
use crate::hardware::registry::RegisteredChannel;
use crate::hardware::status::Status;

/// Completion handles of one issued line.
#[derive(Debug)]
pub struct LineStatus {
    line: usize,
    pending: Vec<(String, &'static str, Status)>,
}

impl LineStatus {
    /// Zero-based line index.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Non-blocking check that every command of the line has finished.
    pub fn is_done(&mut self) -> bool {
        self.pending.iter_mut().all(|(_, _, status)| status.is_done())
    }

    /// Await every handle. The first failure in issue order is returned.
    pub async fn wait(self) -> AppResult<()> {
        let (labels, statuses): (Vec<_>, Vec<_>) = self
            .pending
            .into_iter()
            .map(|(device, operation, status)| ((device, operation), status))
            .unzip();
        let results = join_all(statuses.into_iter().map(Status::wait)).await;
        for ((device, operation), result) in labels.into_iter().zip(results) {
            result.device_context(&device, operation)?;
        }
        Ok(())
    }
}

/// Drives lines on one trajectory generator and its per-line channels.
pub struct LineDriver {
    trajectory_id: String,
    trajectory: Arc<dyn TrajectoryGenerator>,
    channels: Vec<RegisteredChannel>,
    commanded: BTreeSet<String>,
    lines_issued: usize,
    lines_completed: usize,
}

impl LineDriver {
    /// Driver for `trajectory` and the per-line `channels`, in issue order.
    pub fn new(
        trajectory_id: impl Into<String>,
        trajectory: Arc<dyn TrajectoryGenerator>,
        channels: Vec<RegisteredChannel>,
    ) -> Self {
        Self {
            trajectory_id: trajectory_id.into(),
            trajectory,
            channels,
            commanded: BTreeSet::new(),
            lines_issued: 0,
            lines_completed: 0,
        }
    }

    /// Issue the four command groups of the next line.
    #[instrument(skip(self), fields(line = self.lines_issued, trajectory = %self.trajectory_id))]
    pub async fn run_line(&mut self) -> AppResult<LineStatus> {
        let line = self.lines_issued;
        let mut pending = Vec::with_capacity(2 + 2 * self.channels.len());

        self.commanded.insert(self.trajectory_id.clone());
        let status = self
            .trajectory
            .start()
            .await
            .device_context(&self.trajectory_id, "start")?;
        pending.push((self.trajectory_id.clone(), "start", status));

        for channel in &self.channels {
            self.commanded.insert(channel.id.clone());
            let status = channel
                .device
                .start()
                .await
                .device_context(&channel.id, "start")?;
            pending.push((channel.id.clone(), "start", status));
        }

        let status = self
            .trajectory
            .complete()
            .await
            .device_context(&self.trajectory_id, "complete")?;
        pending.push((self.trajectory_id.clone(), "complete", status));

        for channel in &self.channels {
            let status = channel
                .device
                .complete()
                .await
                .device_context(&channel.id, "complete")?;
            pending.push((channel.id.clone(), "complete", status));
        }

        self.lines_issued += 1;
        debug!(commands = pending.len(), "line issued");
        Ok(LineStatus { line, pending })
    }

    /// Await a line issued by this driver and count it as completed.
    pub async fn fence(&mut self, status: LineStatus) -> AppResult<()> {
        let line = status.line();
        status.wait().await?;
        self.lines_completed += 1;
        debug!(line, "line complete");
        Ok(())
    }

    /// Lines whose commands were all issued.
    pub fn lines_issued(&self) -> usize {
        self.lines_issued
    }

    /// Lines fenced successfully.
    pub fn lines_completed(&self) -> usize {
        self.lines_completed
    }

    /// Devices that have received a `start`, including one that failed it.
    pub fn commanded(&self) -> impl Iterator<Item = &str> {
        self.commanded.iter().map(String::as_str)
    }
}
