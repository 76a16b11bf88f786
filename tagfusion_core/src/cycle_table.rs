//! Last observed scan-cycle duration per array.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroU32;
use tagfusion_env::SensorId;
use tracing::debug;

/// Sensor → duration of its most recent full scan cycle (µs).
///
/// Fed only by end-of-cycle diagnostics. An absent or zero entry means the
/// array has not finished a cycle yet, which is normal right after start-up.
#[derive(Debug, Default)]
pub struct CycleTimeTable {
    entries: RwLock<HashMap<SensorId, u32>>,
}

impl CycleTimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the sensor's entry. No aggregation across cycles.
    pub fn record_cycle(&self, sensor: &SensorId, cycle_micros: u32) {
        debug!(sensor = %sensor, cycle_ms = cycle_micros / 1000, "end of cycle");
        self.entries.write().insert(sensor.clone(), cycle_micros);
    }

    /// Raw entry, including a stored zero.
    pub fn lookup(&self, sensor: &SensorId) -> Option<u32> {
        self.entries.read().get(sensor).copied()
    }

    /// Entry usable for confidence weighting.
    pub fn ready(&self, sensor: &SensorId) -> Option<NonZeroU32> {
        self.lookup(sensor).and_then(NonZeroU32::new)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
