//! Raster fly-scan orchestration.
//!
//! # Architecture
//!
//! - **Plan** ([`RasterScan`]): declarative raster definition, resolved
//!   against a [`DeviceRegistry`](crate::hardware::DeviceRegistry) before any
//!   hardware is touched
//! - **Line driver** ([`LineDriver`]): issues one line without blocking
//! - **Orchestrator** ([`RasterOrchestrator`]): state machine driving the
//!   lines, fencing, finalizing and best-effort stopping on failure
//! - **Documents**: Start, Descriptor, Record, Stop, handed to a [`RunRecorder`]
//!
//! # Example
//!
//! ```rust,ignore
//! use lix_daq::experiment::{RasterOrchestrator, RasterScan};
//!
//! let plan = RasterScan::new("ss_x", 0.0, 10.0, 5)
//!     .with_slow_axis("ss_y", 0.0, 4.0, 3)
//!     .with_exposure(0.1)
//!     .with_detectors(&["em1", "pil1M"]);
//!
//! let orchestrator = RasterOrchestrator::new(registry, config.raster);
//! let outcome = run_with_shutter("fs", shutter.as_ref(), orchestrator.run(&plan)).await?;
//! ```

pub mod document;
pub mod line;
pub mod orchestrator;
pub mod plan;
pub mod recorder;
pub mod shutter;

pub use document::{
    CollectedRecord, DataKey, DescriptorDoc, Document, RecordDoc, ScanHeader, StartDoc, StopDoc,
};
pub use line::{LineDriver, LineStatus};
pub use orchestrator::{AbortHandle, RasterOrchestrator, RasterOutcome, RasterState};
pub use plan::{RasterScan, ResolvedRaster};
pub use recorder::{BroadcastRecorder, MemoryRecorder, RunRecorder};
pub use shutter::run_with_shutter;
