//! Acquired data containers.

pub mod readback;

pub use readback::{Collected, DataValue, ReadbackBuffer};
