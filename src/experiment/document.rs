//! Document model for raster fly-scan runs
//!
//! A raster emits Bluesky-style documents so that acquisition stays decoupled
//! from whatever records the run:
//!
//! - **StartDoc**: plan intent, arguments and the scan header
//! - **DescriptorDoc**: schema of one participant's collected data
//! - **RecordDoc**: the bulk-collected data of one participant
//! - **StopDoc**: completion status
//!
//! # Document Flow
//!
//! ```text
//! StartDoc (1, carries ScanHeader)
//!    │
//!    ├── DescriptorDoc (1 per participant: trajectory + each channel)
//!    │       │
//!    │       └── RecordDoc (1 per participant, emitted after the last line)
//!    │
//! StopDoc (1)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::data::readback::{Collected, DataValue};

/// Scan pattern reported in every raster header.
pub const SERPENTINE: &str = "serpentine";

/// Generate a new unique document ID
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Current time in seconds since the Unix epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Shape-and-metadata header attached to a raster run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHeader {
    /// (n_lines, n_points)
    pub shape: (usize, usize),
    /// Motor names, slow axis first when present.
    pub motors: Vec<String>,
    /// Always [`SERPENTINE`].
    pub pattern: String,
    /// Participating detector ids, in plan order.
    pub detectors: Vec<String>,
}

/// Bulk data of one participant, keyed by channel identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedRecord {
    /// Participant that produced the record.
    pub participant: String,
    /// Collection time in seconds since the Unix epoch.
    pub time: f64,
    /// Field -> value or array.
    pub data: HashMap<String, DataValue>,
    /// Field -> timestamps.
    pub timestamps: HashMap<String, Vec<f64>>,
}

impl CollectedRecord {
    /// Record for `participant` holding a single field of the same name.
    pub fn from_collected(participant: &str, collected: Collected) -> Self {
        let mut data = HashMap::new();
        let mut timestamps = HashMap::new();
        data.insert(participant.to_string(), collected.data);
        timestamps.insert(participant.to_string(), collected.timestamps);
        Self {
            participant: participant.to_string(),
            time: now_secs(),
            data,
            timestamps,
        }
    }

    /// The participant's own field.
    pub fn value(&self) -> Option<&DataValue> {
        self.data.get(&self.participant)
    }
}

/// Document types for run data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    /// Run start.
    Start(StartDoc),
    /// Participant schema.
    Descriptor(DescriptorDoc),
    /// Participant data.
    Record(RecordDoc),
    /// Run end.
    Stop(StopDoc),
}

impl Document {
    /// Get the document UID
    pub fn uid(&self) -> &str {
        match self {
            Document::Start(d) => &d.uid,
            Document::Descriptor(d) => &d.uid,
            Document::Record(d) => &d.uid,
            Document::Stop(d) => &d.uid,
        }
    }

    /// Get the run UID this document belongs to
    pub fn run_uid(&self) -> &str {
        match self {
            Document::Start(d) => &d.uid, // Start doc UID is the run UID
            Document::Descriptor(d) => &d.run_uid,
            Document::Record(d) => &d.run_uid,
            Document::Stop(d) => &d.run_uid,
        }
    }

    /// Short name of the document kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Start(_) => "start",
            Document::Descriptor(_) => "descriptor",
            Document::Record(_) => "record",
            Document::Stop(_) => "stop",
        }
    }
}

/// Start document - emitted before any device is configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDoc {
    /// Unique run identifier (this IS the run_uid)
    pub uid: String,
    /// Plan type that generated this run
    pub plan_type: String,
    /// User-friendly plan name
    pub plan_name: String,
    /// Plan arguments
    pub plan_args: HashMap<String, String>,
    /// Shape, motors and pattern
    pub header: ScanHeader,
    /// User-provided metadata
    pub metadata: HashMap<String, String>,
    /// Timestamp when run started
    pub time: f64,
}

impl StartDoc {
    /// New start document for a run of `plan_type`.
    pub fn new(plan_type: &str, plan_name: &str, header: ScanHeader) -> Self {
        Self {
            uid: new_uid(),
            plan_type: plan_type.to_string(),
            plan_name: plan_name.to_string(),
            plan_args: HashMap::new(),
            header,
            metadata: HashMap::new(),
            time: now_secs(),
        }
    }

    /// Add a plan argument.
    pub fn with_arg(mut self, key: &str, value: &str) -> Self {
        self.plan_args.insert(key.to_string(), value.to_string());
        self
    }

    /// Add user metadata.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Schema for a data field within records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    /// Data type: "array" or "resource"
    pub dtype: String,
    /// Expected shape
    pub shape: Vec<usize>,
    /// Source device ID
    pub source: String,
    /// Physical units
    pub units: String,
}

impl DataKey {
    /// Inline numeric array.
    pub fn array(source: &str, shape: Vec<usize>) -> Self {
        Self {
            dtype: "array".to_string(),
            shape,
            source: source.to_string(),
            units: String::new(),
        }
    }

    /// Externally stored frames.
    pub fn resource(source: &str, frames: usize) -> Self {
        Self {
            dtype: "resource".to_string(),
            shape: vec![frames],
            source: source.to_string(),
            units: String::new(),
        }
    }
}

/// Descriptor document - schema of one participant's record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorDoc {
    /// Unique descriptor ID
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Participant name
    pub name: String,
    /// Schema for data fields
    pub data_keys: HashMap<String, DataKey>,
    /// Device configuration at descriptor creation time
    pub configuration: HashMap<String, String>,
    /// Timestamp
    pub time: f64,
}

impl DescriptorDoc {
    /// New descriptor for participant `name`.
    pub fn new(run_uid: &str, name: &str) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            name: name.to_string(),
            data_keys: HashMap::new(),
            configuration: HashMap::new(),
            time: now_secs(),
        }
    }

    /// Add a field schema.
    pub fn with_data_key(mut self, name: &str, key: DataKey) -> Self {
        self.data_keys.insert(name.to_string(), key);
        self
    }

    /// Add a configuration entry.
    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.configuration.insert(key.to_string(), value.to_string());
        self
    }
}

/// Record document - one participant's collected data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDoc {
    /// Unique record ID
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Links to the participant's DescriptorDoc
    pub descriptor_uid: String,
    /// The data
    pub record: CollectedRecord,
}

impl RecordDoc {
    /// Wrap a record.
    pub fn new(run_uid: &str, descriptor_uid: &str, record: CollectedRecord) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            descriptor_uid: descriptor_uid.to_string(),
            record,
        }
    }
}

/// Stop document - emitted at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopDoc {
    /// Unique stop doc ID
    pub uid: String,
    /// Links to StartDoc
    pub run_uid: String,
    /// Exit status: "success", "abort", "fail"
    pub exit_status: String,
    /// Reason for abort/failure
    pub reason: String,
    /// Timestamp when run ended
    pub time: f64,
    /// Lines driven before the run ended
    pub lines_completed: usize,
}

impl StopDoc {
    fn with_status(run_uid: &str, status: &str, reason: &str, lines_completed: usize) -> Self {
        Self {
            uid: new_uid(),
            run_uid: run_uid.to_string(),
            exit_status: status.to_string(),
            reason: reason.to_string(),
            time: now_secs(),
            lines_completed,
        }
    }

    /// Normal completion.
    pub fn success(run_uid: &str, lines_completed: usize) -> Self {
        Self::with_status(run_uid, "success", "", lines_completed)
    }

    /// Aborted by request.
    pub fn abort(run_uid: &str, reason: &str, lines_completed: usize) -> Self {
        Self::with_status(run_uid, "abort", reason, lines_completed)
    }

    /// Failed with an error.
    pub fn fail(run_uid: &str, reason: &str, lines_completed: usize) -> Self {
        Self::with_status(run_uid, "fail", reason, lines_completed)
    }
}
