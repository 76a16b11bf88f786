//! JSON exporter for simulation runs.
//!
//! Writes fused estimates next to their ground truth, plus the duty-cycle
//! phases and swallowed reader failures, for offline inspection.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tagfusion_core::{FusedEstimate, PhaseSummary, ReaderFailure};
use uuid::Uuid;

/// One fused estimate compared against where the tag really is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateRecord {
    #[serde(flatten)]
    pub estimate: FusedEstimate,
    pub truth_x_cm: f64,
    pub truth_y_cm: f64,
    /// Euclidean error; absent for invalid estimates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_cm: Option<f64>,
}

impl EstimateRecord {
    pub fn new(estimate: FusedEstimate, truth: (f64, f64)) -> Self {
        let error_cm = estimate
            .position
            .coordinates()
            .map(|(x, y)| ((x as f64 - truth.0).powi(2) + (y as f64 - truth.1).powi(2)).sqrt());
        Self {
            estimate,
            truth_x_cm: truth.0,
            truth_y_cm: truth.1,
            error_cm,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub sensor: String,
    pub op: String,
    pub error: String,
}

impl From<&ReaderFailure> for FailureRecord {
    fn from(failure: &ReaderFailure) -> Self {
        Self {
            sensor: failure.sensor.to_string(),
            op: failure.op.to_string(),
            error: failure.error.to_string(),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    pub run_id: Uuid,

    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Virtual time consumed by the run
    pub virtual_time_sec: f64,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub estimates: Vec<EstimateRecord>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseSummary>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_rms_error_cm: Option<f64>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.to_string(),
            seed,
            virtual_time_sec: 0.0,
            estimates: Vec::new(),
            phases: Vec::new(),
            failures: Vec::new(),
            passed: false,
            final_rms_error_cm: None,
        }
    }

    pub fn add_estimate(&mut self, record: EstimateRecord) {
        self.estimates.push(record);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, rms_error_cm: Option<f64>) {
        self.passed = passed;
        self.final_rms_error_cm = rms_error_cm;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
