use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a survey line within one processing run
pub type LineId = u32;

/// One positioned total-field measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    /// Geodetic latitude in degrees
    pub lat: f64,
    /// Geodetic longitude in degrees
    pub lon: f64,
    /// Measured scalar total field in nT
    pub total_field: f64,
    /// Anomaly (reading minus reference field) in nT, set by the correction chain
    pub anomaly: Option<f64>,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, lat: f64, lon: f64, total_field: f64) -> Self {
        Self {
            time,
            lat,
            lon,
            total_field,
            anomaly: None,
        }
    }
}

/// An ordered sequence of samples from one cruise/acquisition run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub cruise_id: u32,
    pub samples: Vec<Sample>,
}

impl Track {
    pub fn new(cruise_id: u32, samples: Vec<Sample>) -> Self {
        Self { cruise_id, samples }
    }

    /// Check track invariants: at least 2 samples, strictly increasing
    /// timestamps, no two samples at identical position and time
    pub fn validate(&self) -> MagResult<()> {
        if self.samples.len() < 2 {
            return Err(MagError::InvalidTrack(format!(
                "cruise {}: {} sample(s), need at least 2",
                self.cruise_id,
                self.samples.len()
            )));
        }

        for (i, pair) in self.samples.windows(2).enumerate() {
            if pair[1].time <= pair[0].time {
                return Err(MagError::InvalidTrack(format!(
                    "cruise {}: non-monotonic timestamp at sample {} ({} -> {})",
                    self.cruise_id,
                    i + 1,
                    pair[0].time,
                    pair[1].time
                )));
            }
        }

        Ok(())
    }
}

/// Classification of a segment produced by the track splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Full survey line, participates in crossover leveling
    Line,
    /// Too short for leveling; retained for reporting and export only
    Skipped,
}

/// A maximal contiguous run of samples from one track, the leveling unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub line_id: LineId,
    pub cruise_id: u32,
    pub kind: SegmentKind,
    pub samples: Vec<Sample>,
}

impl Segment {
    /// Timestamp range covered by this segment
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => Some((a.time, b.time)),
            _ => None,
        }
    }
}

/// One observed crossover between two survey lines.
///
/// Lines are stored smaller-id-first; `misfit` is the first line's
/// interpolated anomaly minus the second line's at the crossing point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tie {
    pub line_a: LineId,
    pub line_b: LineId,
    /// Crossing point latitude in degrees
    pub lat: f64,
    /// Crossing point longitude in degrees
    pub lon: f64,
    /// Interpolated anomaly of line_a at the crossing, nT
    pub anomaly_a: f64,
    /// Interpolated anomaly of line_b at the crossing, nT
    pub anomaly_b: f64,
    /// anomaly_a - anomaly_b, nT
    pub misfit: f64,
    /// Distance-based confidence in (0, 1]
    pub weight: f64,
}

/// One additive scalar correction per leveled line
pub type LineCorrections = HashMap<LineId, f64>;

/// Why a line was excluded from (or degraded in) leveling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub line_id: LineId,
    pub reason: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Error types for magnetometer processing
#[derive(Debug, thiserror::Error)]
pub enum MagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    #[error("Missing reference data: {0}")]
    MissingReferenceData(String),

    #[error("Poorly conditioned leveling network: {0}")]
    PoorlyConditionedNetwork(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for magnetometer operations
pub type MagResult<T> = Result<T, MagError>;
