//! Per-line readback accumulation for flyable channels.
//!
//! A per-line channel hands over one chunk of samples each time a raster
//! line completes. `ReadbackBuffer` keeps those chunks in line order together
//! with a timestamp per line, and turns them into a single (n_lines, n_points)
//! array at collection time. The buffer is cleared at the start of every
//! raster call; collecting an empty buffer is valid and yields shape (0, n).

use serde::{Deserialize, Serialize};

/// Value produced by one participant at collection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataValue {
    /// Row-major numeric array.
    Array {
        /// Dimensions, slowest first.
        shape: Vec<usize>,
        /// Flattened values.
        values: Vec<f64>,
    },
    /// Reference to bulk data written by the device itself (e.g. a frame file).
    Resource {
        /// Location of the data.
        uri: String,
        /// Number of frames behind the reference.
        frames: usize,
    },
}

impl DataValue {
    /// Shape of the value. Resources are one-dimensional in frames.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            DataValue::Array { shape, .. } => shape.clone(),
            DataValue::Resource { frames, .. } => vec![*frames],
        }
    }

    /// Number of samples or frames held.
    pub fn len(&self) -> usize {
        match self {
            DataValue::Array { values, .. } => values.len(),
            DataValue::Resource { frames, .. } => *frames,
        }
    }

    /// True when no samples or frames are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a device returns from `collect()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collected {
    /// The data itself.
    pub data: DataValue,
    /// Timestamps in seconds since the Unix epoch (one per line for per-line channels).
    pub timestamps: Vec<f64>,
}

/// Ordered per-line chunks plus per-line timestamps.
#[derive(Debug, Clone, Default)]
pub struct ReadbackBuffer {
    points_per_line: usize,
    lines: Vec<Vec<f64>>,
    timestamps: Vec<f64>,
}

impl ReadbackBuffer {
    /// Empty buffer expecting `points_per_line` samples per line.
    pub fn new(points_per_line: usize) -> Self {
        Self {
            points_per_line,
            lines: Vec::new(),
            timestamps: Vec::new(),
        }
    }

    /// Drops accumulated lines and re-targets the line length.
    pub fn reset(&mut self, points_per_line: usize) {
        self.points_per_line = points_per_line;
        self.clear();
    }

    /// Drops accumulated lines.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.timestamps.clear();
    }

    /// Appends one completed line.
    ///
    /// Short chunks are padded with NaN and long ones truncated so the
    /// collected shape stays (n_lines, points_per_line).
    pub fn push_line(&mut self, mut chunk: Vec<f64>, timestamp: f64) {
        if chunk.len() != self.points_per_line {
            tracing::warn!(
                line = self.lines.len(),
                expected = self.points_per_line,
                got = chunk.len(),
                "readback length mismatch"
            );
            chunk.resize(self.points_per_line, f64::NAN);
        }
        self.lines.push(chunk);
        self.timestamps.push(timestamp);
    }

    /// Number of completed lines held.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Expected samples per line.
    pub fn points_per_line(&self) -> usize {
        self.points_per_line
    }

    /// Concatenates the lines into one (n_lines, points_per_line) array.
    pub fn collect(&self) -> Collected {
        let values: Vec<f64> = self.lines.iter().flatten().copied().collect();
        Collected {
            data: DataValue::Array {
                shape: vec![self.lines.len(), self.points_per_line],
                values,
            },
            timestamps: self.timestamps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_after_clear_is_empty_not_error() {
        let mut buffer = ReadbackBuffer::new(5);
        buffer.push_line(vec![1.0; 5], 10.0);
        buffer.clear();

        let collected = buffer.collect();
        assert_eq!(collected.data.shape(), vec![0, 5]);
        assert!(collected.data.is_empty());
        assert!(collected.timestamps.is_empty());
    }

    #[test]
    fn test_lines_keep_order_and_shape() {
        let mut buffer = ReadbackBuffer::new(3);
        buffer.push_line(vec![1.0, 2.0, 3.0], 1.0);
        buffer.push_line(vec![4.0, 5.0, 6.0], 2.0);

        let collected = buffer.collect();
        assert_eq!(
            collected.data,
            DataValue::Array {
                shape: vec![2, 3],
                values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            }
        );
        assert_eq!(collected.timestamps, vec![1.0, 2.0]);
    }

    #[test]
    fn test_short_line_is_padded() {
        let mut buffer = ReadbackBuffer::new(3);
        buffer.push_line(vec![1.0], 1.0);
        buffer.push_line(vec![1.0, 2.0, 3.0, 4.0], 2.0);

        let collected = buffer.collect();
        assert_eq!(collected.data.shape(), vec![2, 3]);
        match collected.data {
            DataValue::Array { values, .. } => {
                assert!(values[1].is_nan() && values[2].is_nan());
                assert_eq!(&values[3..], &[1.0, 2.0, 3.0]);
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_resource_shape_is_frame_count() {
        let value = DataValue::Resource {
            uri: "file:///data/pil1M_000.h5".into(),
            frames: 15,
        };
        assert_eq!(value.shape(), vec![15]);
        assert_eq!(value.len(), 15);
    }
}
