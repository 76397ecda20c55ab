//! Device registry.
//!
//! Plans refer to devices by id. The registry owns the shared handles and
//! the capability descriptors attached when a channel is registered, and it
//! enforces the pairing between a fast axis and its trajectory generator.

use std::collections::HashMap;
use std::sync::Arc;

use super::capabilities::{
    AcquisitionChannel, ChannelDescriptor, Movable, Shutter, TrajectoryGenerator,
};
use crate::error::{AppResult, DaqError};

/// A channel together with its registration-time descriptor.
#[derive(Clone)]
pub struct RegisteredChannel {
    /// Registry id.
    pub id: String,
    /// Capability tag.
    pub descriptor: ChannelDescriptor,
    /// Device handle.
    pub device: Arc<dyn AcquisitionChannel>,
}

impl std::fmt::Debug for RegisteredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredChannel")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Id -> device lookup for motors, trajectory generators, channels and shutters.
#[derive(Default)]
pub struct DeviceRegistry {
    motors: HashMap<String, Arc<dyn Movable>>,
    trajectories: HashMap<String, (String, Arc<dyn TrajectoryGenerator>)>,
    channels: HashMap<String, RegisteredChannel>,
    shutters: HashMap<String, Arc<dyn Shutter>>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a motor.
    pub fn register_motor(&mut self, id: impl Into<String>, motor: Arc<dyn Movable>) {
        self.motors.insert(id.into(), motor);
    }

    /// Pair a trajectory generator with an already registered fast axis.
    pub fn attach_trajectory(
        &mut self,
        axis_id: &str,
        trajectory_id: impl Into<String>,
        trajectory: Arc<dyn TrajectoryGenerator>,
    ) -> AppResult<()> {
        if !self.motors.contains_key(axis_id) {
            return Err(DaqError::Configuration(format!(
                "cannot attach trajectory to unknown axis '{}'",
                axis_id
            )));
        }
        self.trajectories
            .insert(axis_id.to_string(), (trajectory_id.into(), trajectory));
        Ok(())
    }

    /// Register an acquisition channel with its capability descriptor.
    pub fn register_channel(
        &mut self,
        id: impl Into<String>,
        device: Arc<dyn AcquisitionChannel>,
        descriptor: ChannelDescriptor,
    ) {
        let id = id.into();
        self.channels.insert(
            id.clone(),
            RegisteredChannel {
                id,
                descriptor,
                device,
            },
        );
    }

    /// Register a shutter.
    pub fn register_shutter(&mut self, id: impl Into<String>, shutter: Arc<dyn Shutter>) {
        self.shutters.insert(id.into(), shutter);
    }

    /// Look up a motor.
    pub fn motor(&self, id: &str) -> AppResult<Arc<dyn Movable>> {
        self.motors
            .get(id)
            .cloned()
            .ok_or_else(|| DaqError::Configuration(format!("unknown motor '{}'", id)))
    }

    /// Trajectory generator paired with `axis_id`, with its own id.
    pub fn trajectory_for(&self, axis_id: &str) -> AppResult<(String, Arc<dyn TrajectoryGenerator>)> {
        self.trajectories.get(axis_id).cloned().ok_or_else(|| {
            DaqError::Configuration(format!(
                "axis '{}' has no trajectory generator attached",
                axis_id
            ))
        })
    }

    /// Look up a channel.
    pub fn channel(&self, id: &str) -> AppResult<RegisteredChannel> {
        self.channels
            .get(id)
            .cloned()
            .ok_or_else(|| DaqError::Configuration(format!("unknown detector '{}'", id)))
    }

    /// Look up a shutter.
    pub fn shutter(&self, id: &str) -> AppResult<Arc<dyn Shutter>> {
        self.shutters
            .get(id)
            .cloned()
            .ok_or_else(|| DaqError::Configuration(format!("unknown shutter '{}'", id)))
    }

    /// Registered channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.keys().cloned().collect();
        ids.sort();
        ids
    }
}
