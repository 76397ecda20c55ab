//! Hardware abstraction for fly scanning.
//!
//! Capability traits, the completion handle every non-blocking command
//! returns, the per-device command queue, the device registry and the
//! simulated devices used by tests and the demo.

pub mod capabilities;
pub mod mock;
pub mod queue;
pub mod registry;
pub mod status;

pub use capabilities::{
    AcquisitionChannel, AcquisitionConfig, ChannelDescriptor, DetectorFamily, Movable, Shutter,
    TrajectoryGenerator, TrajectoryParameters,
};
pub use registry::{DeviceRegistry, RegisteredChannel};
pub use status::{Status, StatusCompleter};
