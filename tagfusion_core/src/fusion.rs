//! The "FUSION" Engine - confidence-weighted position averaging across arrays
//!
//! Every array computes its own position for a tag. The engine combines them:
//! 1. Confidence: read count normalized by expected scan cycles
//! 2. Accumulation: confidence-weighted sums per tag
//! 3. Completion: a policy decides when the tag's cycle is closed
//! 4. Emission: floored weighted mean, then the tag's sums reset to zero
//!
//! `ingest_location` and `ingest_diagnostic` take `&self` and may be called
//! from one task per array concurrently.

use crate::accumulator::{AccumulatorTable, TagAccumulator};
use crate::completion::{CompletionPolicy, TriggerSensor};
use crate::confidence::ConfidenceCalculator;
use crate::config::{ConfigError, FusionConfig};
use crate::cycle_table::CycleTimeTable;
use crate::events::{DiagnosticEvent, FusedEstimate, LocationEvent};
use tagfusion_env::{DiagnosticReport, SensorId, TagId, END_OF_CYCLE_METRIC};
use tracing::{debug, info, trace};

/// Multi-array fusion engine.
pub struct FusionEngine<P = TriggerSensor> {
    calculator: ConfidenceCalculator,
    cycles: CycleTimeTable,
    accumulators: AccumulatorTable,
    policy: P,
}

impl FusionEngine<TriggerSensor> {
    /// Creates an engine that closes cycles on trigger-sensor reports.
    pub fn new(config: &FusionConfig) -> Result<Self, ConfigError> {
        Self::with_policy(config, TriggerSensor)
    }
}

impl<P: CompletionPolicy> FusionEngine<P> {
    pub fn with_policy(config: &FusionConfig, policy: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            calculator: ConfidenceCalculator::new(config.compute_window()),
            cycles: CycleTimeTable::new(),
            accumulators: AccumulatorTable::new(),
            policy,
        })
    }

    /// Folds one array's position into the tag's cycle.
    ///
    /// Returns the fused estimate when this event closes the cycle. Events from
    /// an array without a usable cycle time are dropped without touching state.
    pub fn ingest_location(&self, event: &LocationEvent) -> Option<FusedEstimate> {
        let Some(cycle_micros) = self.cycles.ready(&event.sensor) else {
            trace!(sensor = %event.sensor, tag = %event.tag, "no cycle time yet, dropping report");
            return None;
        };

        let confidence = self.calculator.score(event.read_count, cycle_micros);
        debug!(
            sensor = %event.sensor,
            tag = %event.tag,
            x = event.x_cm,
            y = event.y_cm,
            confidence,
            "location observation"
        );

        let entry = self.accumulators.entry(&event.tag);
        let mut acc = entry.lock();
        acc.accumulate(confidence, event.x_cm, event.y_cm);

        if !self.policy.completes_cycle(event, &acc) {
            return None;
        }

        let estimate = FusedEstimate {
            tag: event.tag.clone(),
            position: acc.estimate(),
            observations: acc.observations,
            confidence_sum: acc.confidence_sum,
        };
        acc.reset();
        drop(acc);

        info!(
            tag = %estimate.tag,
            observations = estimate.observations,
            "weighted: {}",
            estimate.position
        );
        Some(estimate)
    }

    /// Records end-of-cycle durations; other metric codes belong to health
    /// monitoring and are ignored here.
    pub fn ingest_diagnostic(&self, sensor: &SensorId, metric_code: u32, value: u32) {
        if metric_code == END_OF_CYCLE_METRIC {
            self.cycles.record_cycle(sensor, value);
        }
    }

    pub fn ingest_diagnostic_event(&self, event: &DiagnosticEvent) {
        self.ingest_diagnostic(&event.sensor, event.metric_code, event.value);
    }

    /// Convenience for raw reader diagnostics; truncated reports are ignored.
    pub fn ingest_diagnostic_report(&self, sensor: &SensorId, report: &DiagnosticReport) {
        if let Some(event) = DiagnosticEvent::from_report(sensor.clone(), report) {
            self.ingest_diagnostic_event(&event);
        }
    }

    /// Current in-cycle state for a tag.
    pub fn snapshot(&self, tag: &TagId) -> Option<TagAccumulator> {
        self.accumulators.snapshot(tag)
    }

    /// Every tag observed so far, sorted.
    pub fn tracked_tags(&self) -> Vec<TagId> {
        self.accumulators.tags()
    }

    pub fn cycle_table(&self) -> &CycleTimeTable {
        &self.cycles
    }

    pub fn compute_window(&self) -> std::time::Duration {
        self.calculator.compute_window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FusedPosition, InvalidReason};
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    const TAG: &str = "E28011606000020912345678";

    fn engine() -> FusionEngine {
        // 30 s window; both arrays at 2 s cycles -> 15 expected cycles
        let engine = FusionEngine::new(&FusionConfig::default()).unwrap();
        engine.ingest_diagnostic(&SensorId::new("xarray-a"), END_OF_CYCLE_METRIC, 2_000_000);
        engine.ingest_diagnostic(&SensorId::new("xarray-b"), END_OF_CYCLE_METRIC, 2_000_000);
        engine
    }

    fn event(sensor: &str, x: i32, y: i32, reads: u32, from_trigger: bool) -> LocationEvent {
        LocationEvent {
            sensor: SensorId::new(sensor),
            tag: TagId::new(TAG),
            x_cm: x,
            y_cm: y,
            read_count: reads,
            from_trigger,
        }
    }

    #[test]
    fn test_two_array_weighted_estimate() {
        let engine = engine();
        let tag = TagId::new(TAG);

        // confidence 2.0 at (100, 200)
        assert!(engine.ingest_location(&event("xarray-a", 100, 200, 30, false)).is_none());
        let snap = engine.snapshot(&tag).unwrap();
        assert_relative_eq!(snap.confidence_sum, 2.0);

        // confidence 1.0 at (250, 500): x = 450/3 = 150, y = 900/3 = 300
        let estimate = engine
            .ingest_location(&event("xarray-b", 250, 500, 15, true))
            .unwrap();
        assert_eq!(estimate.position, FusedPosition::Position { x_cm: 150, y_cm: 300 });
        assert_eq!(estimate.observations, 2);
        assert_relative_eq!(estimate.confidence_sum, 3.0);
    }

    #[test]
    fn test_estimate_floors() {
        let engine = engine();
        engine.ingest_location(&event("xarray-a", 100, 100, 15, false));
        let estimate = engine
            .ingest_location(&event("xarray-b", 101, 102, 15, true))
            .unwrap();
        // 100.5 and 101.0
        assert_eq!(estimate.position, FusedPosition::Position { x_cm: 100, y_cm: 101 });
    }

    #[test]
    fn test_reset_after_trigger() {
        let engine = engine();
        let tag = TagId::new(TAG);

        engine.ingest_location(&event("xarray-a", 100, 100, 30, false));
        engine.ingest_location(&event("xarray-b", 300, 300, 30, true));

        let snap = engine.snapshot(&tag).unwrap();
        assert!(snap.is_empty());
        assert_eq!(snap.confidence_sum, 0.0);

        // next cycle starts from zero
        let estimate = engine
            .ingest_location(&event("xarray-b", 40, 60, 15, true))
            .unwrap();
        assert_eq!(estimate.position, FusedPosition::Position { x_cm: 40, y_cm: 60 });
        assert_eq!(estimate.observations, 1);
    }

    #[test]
    fn test_zero_confidence_emits_invalid() {
        let engine = engine();
        engine.ingest_location(&event("xarray-a", 100, 100, 0, false));
        let estimate = engine
            .ingest_location(&event("xarray-b", 200, 200, 0, true))
            .unwrap();
        assert_eq!(estimate.position, FusedPosition::Invalid(InvalidReason::ZeroConfidence));
        assert!(engine.snapshot(&TagId::new(TAG)).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_sensor_dropped() {
        let engine = engine();
        let tag = TagId::new(TAG);
        engine.ingest_location(&event("xarray-a", 100, 100, 30, false));
        let before = engine.snapshot(&tag).unwrap();

        assert!(engine.ingest_location(&event("xarray-z", 900, 900, 30, true)).is_none());
        assert_eq!(engine.snapshot(&tag).unwrap(), before);
    }

    #[test]
    fn test_dropped_event_does_not_create_tag() {
        let engine = FusionEngine::new(&FusionConfig::default()).unwrap();
        assert!(engine.ingest_location(&event("xarray-a", 1, 1, 5, true)).is_none());
        assert!(engine.tracked_tags().is_empty());
    }

    #[test]
    fn test_zero_cycle_entry_drops() {
        let engine = FusionEngine::new(&FusionConfig::default()).unwrap();
        engine.ingest_diagnostic(&SensorId::new("xarray-a"), END_OF_CYCLE_METRIC, 0);
        assert!(engine.ingest_location(&event("xarray-a", 1, 1, 5, true)).is_none());
        assert!(engine.tracked_tags().is_empty());
    }

    #[test]
    fn test_other_diagnostic_codes_ignored() {
        let engine = FusionEngine::new(&FusionConfig::default()).unwrap();
        let sensor = SensorId::new("xarray-a");
        engine.ingest_diagnostic(&sensor, 42, 2_000_000);
        assert_eq!(engine.cycle_table().lookup(&sensor), None);

        engine.ingest_diagnostic_report(&sensor, &DiagnosticReport::end_of_cycle(1_000_000));
        assert_eq!(engine.cycle_table().lookup(&sensor), Some(1_000_000));
    }

    #[test]
    fn test_zero_compute_window_rejected() {
        let config = FusionConfig {
            compute_window_secs: 0,
            ..FusionConfig::default()
        };
        assert!(matches!(
            FusionEngine::new(&config),
            Err(ConfigError::ZeroComputeWindow)
        ));
    }

    #[test]
    fn test_custom_completion_policy() {
        let config = FusionConfig::default();
        let engine = FusionEngine::with_policy(&config, |_: &LocationEvent, s: &TagAccumulator| {
            s.observations == 3
        })
        .unwrap();
        engine.ingest_diagnostic(&SensorId::new("xarray-a"), END_OF_CYCLE_METRIC, 2_000_000);

        assert!(engine.ingest_location(&event("xarray-a", 10, 10, 15, true)).is_none());
        assert!(engine.ingest_location(&event("xarray-a", 20, 20, 15, true)).is_none());
        let estimate = engine.ingest_location(&event("xarray-a", 30, 30, 15, false)).unwrap();
        assert_eq!(estimate.position, FusedPosition::Position { x_cm: 20, y_cm: 20 });
    }

    #[test]
    fn test_tags_are_independent() {
        let engine = engine();
        let mut other = event("xarray-a", 500, 500, 30, false);
        other.tag = TagId::new("E200");
        engine.ingest_location(&other);
        engine.ingest_location(&event("xarray-a", 100, 100, 30, false));

        let estimate = engine.ingest_location(&event("xarray-b", 100, 100, 30, true)).unwrap();
        assert_eq!(estimate.position, FusedPosition::Position { x_cm: 100, y_cm: 100 });
        assert_eq!(engine.snapshot(&TagId::new("E200")).unwrap().observations, 1);
        assert_eq!(engine.tracked_tags().len(), 2);
    }

    #[test]
    fn test_concurrent_ingestion_matches_sequential() {
        let engine = Arc::new(engine());
        let tag = TagId::new(TAG);
        let events: Vec<LocationEvent> = (0..64)
            .map(|i| {
                let sensor = if i % 2 == 0 { "xarray-a" } else { "xarray-b" };
                event(sensor, 10 * i, 5 * i, (i as u32 % 7) + 1, false)
            })
            .collect();

        let handles: Vec<_> = events
            .chunks(8)
            .map(|chunk| {
                let engine = Arc::clone(&engine);
                let chunk = chunk.to_vec();
                std::thread::spawn(move || {
                    for e in &chunk {
                        engine.ingest_location(e);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequential = self::engine();
        for e in &events {
            sequential.ingest_location(e);
        }

        let concurrent_state = engine.snapshot(&tag).unwrap();
        let sequential_state = sequential.snapshot(&tag).unwrap();
        assert_eq!(concurrent_state.observations, 64);
        assert_relative_eq!(concurrent_state.confidence_sum, sequential_state.confidence_sum, epsilon = 1e-9);
        assert_relative_eq!(concurrent_state.weighted_x, sequential_state.weighted_x, epsilon = 1e-6);
        assert_relative_eq!(concurrent_state.weighted_y, sequential_state.weighted_y, epsilon = 1e-6);
    }

    proptest! {
        #[test]
        fn prop_estimate_independent_of_order(
            // Read counts in multiples of 15 keep every confidence integral,
            // so the weighted sums are exact in any order.
            obs in prop::collection::vec(
                (0i32..2000, 0i32..2000, (1u32..5).prop_map(|k| k * 15)),
                1..12,
            ),
            rotation in 0usize..12,
        ) {
            let expected = {
                let conf: Vec<f64> = obs.iter().map(|&(_, _, r)| r as f64 / 15.0).collect();
                let sum: f64 = conf.iter().sum();
                let wx: f64 = obs.iter().zip(&conf).map(|(&(x, _, _), c)| c * x as f64).sum();
                let wy: f64 = obs.iter().zip(&conf).map(|(&(_, y, _), c)| c * y as f64).sum();
                ((wx / sum).floor() as i64, (wy / sum).floor() as i64)
            };

            let mut rotated = obs.clone();
            let len = rotated.len();
            rotated.rotate_left(rotation % len);

            let engine = engine();
            let mut emitted = None;
            for (i, &(x, y, reads)) in rotated.iter().enumerate() {
                let last = i + 1 == len;
                let sensor = if last { "xarray-b" } else { "xarray-a" };
                emitted = engine.ingest_location(&event(sensor, x, y, reads, last));
            }

            let (x, y) = emitted.unwrap().position.coordinates().unwrap();
            prop_assert_eq!((x, y), expected);
        }
    }
}
