//! Per-observation confidence weighting.
//!
//! A raw read count is only comparable between arrays once it is normalized
//! by how many scan cycles fit into the compute window:
//!
//! ```text
//! expected_cycles = max(1, floor(window_µs / cycle_µs))
//! confidence      = read_count / expected_cycles
//! ```
//!
//! Confidence is a unitless weight, not a probability, and may exceed 1.

use std::num::NonZeroU32;
use std::time::Duration;

/// Scan cycles expected within `compute_window`, clamped to at least one.
pub fn expected_cycles(compute_window: Duration, cycle_micros: NonZeroU32) -> u64 {
    let window_micros = u64::try_from(compute_window.as_micros()).unwrap_or(u64::MAX);
    // Integer division floors for positive operands.
    (window_micros / u64::from(cycle_micros.get())).max(1)
}

/// Computes confidence for one location report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceCalculator {
    compute_window: Duration,
}

impl ConfidenceCalculator {
    pub fn new(compute_window: Duration) -> Self {
        Self { compute_window }
    }

    pub fn compute_window(&self) -> Duration {
        self.compute_window
    }

    pub fn score(&self, read_count: u32, cycle_micros: NonZeroU32) -> f64 {
        f64::from(read_count) / expected_cycles(self.compute_window, cycle_micros) as f64
    }
}
