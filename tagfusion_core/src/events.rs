//! Events consumed and produced by the fusion engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use tagfusion_env::{DiagnosticReport, LocationReport, SensorId, TagId};

/// One array's position for one tag. Not stored beyond processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub sensor: SensorId,
    pub tag: TagId,
    pub x_cm: i32,
    pub y_cm: i32,
    pub read_count: u32,
    /// Whether `sensor` is the array that closes fusion cycles
    pub from_trigger: bool,
}

impl LocationEvent {
    pub fn from_report(sensor: SensorId, report: LocationReport, from_trigger: bool) -> Self {
        Self {
            sensor,
            tag: report.tag,
            x_cm: report.x_cm,
            y_cm: report.y_cm,
            read_count: report.read_count,
            from_trigger,
        }
    }
}

/// A single diagnostic metric from one array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub sensor: SensorId,
    pub metric_code: u32,
    pub value: u32,
}

impl DiagnosticEvent {
    /// Extracts the leading (code, value) pair; `None` for truncated reports.
    pub fn from_report(sensor: SensorId, report: &DiagnosticReport) -> Option<Self> {
        Some(Self {
            sensor,
            metric_code: report.code()?,
            value: report.value()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// Every contribution in the cycle carried zero confidence.
    ZeroConfidence,
}

/// Outcome of one fusion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusedPosition {
    /// Floored confidence-weighted mean (cm)
    Position { x_cm: i64, y_cm: i64 },
    Invalid(InvalidReason),
}

impl FusedPosition {
    pub fn is_valid(&self) -> bool {
        matches!(self, FusedPosition::Position { .. })
    }

    pub fn coordinates(&self) -> Option<(i64, i64)> {
        match *self {
            FusedPosition::Position { x_cm, y_cm } => Some((x_cm, y_cm)),
            FusedPosition::Invalid(_) => None,
        }
    }
}

impl fmt::Display for FusedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusedPosition::Position { x_cm, y_cm } => write!(f, "x={} y={}", x_cm, y_cm),
            FusedPosition::Invalid(InvalidReason::ZeroConfidence) => {
                f.write_str("invalid read, confidence is 0")
            }
        }
    }
}

/// The fused estimate emitted when a tag's cycle completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    pub tag: TagId,
    pub position: FusedPosition,
    /// Location events folded into this estimate
    pub observations: u32,
    /// Sum of their confidences
    pub confidence_sum: f64,
}
