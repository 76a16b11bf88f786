//! In-flight weighted sums per tag.

use crate::events::{FusedPosition, InvalidReason};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tagfusion_env::TagId;

/// Weighted position sums for one tag within the current fusion cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TagAccumulator {
    pub weighted_x: f64,
    pub weighted_y: f64,
    pub confidence_sum: f64,
    /// Location events folded in since the last reset
    pub observations: u32,
}

impl TagAccumulator {
    pub fn accumulate(&mut self, confidence: f64, x_cm: i32, y_cm: i32) {
        self.weighted_x += confidence * f64::from(x_cm);
        self.weighted_y += confidence * f64::from(y_cm);
        self.confidence_sum += confidence;
        self.observations += 1;
    }

    /// Floored confidence-weighted mean, or the invalid marker when the cycle
    /// carries no confidence at all.
    pub fn estimate(&self) -> FusedPosition {
        if self.confidence_sum == 0.0 {
            return FusedPosition::Invalid(InvalidReason::ZeroConfidence);
        }
        FusedPosition::Position {
            x_cm: (self.weighted_x / self.confidence_sum).floor() as i64,
            y_cm: (self.weighted_y / self.confidence_sum).floor() as i64,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.observations == 0
    }
}

/// Accumulators for every tag seen so far.
///
/// Each tag has its own lock so the accumulate-then-maybe-reset sequence is
/// atomic per tag while different tags proceed in parallel. Entries are never
/// removed; a reset zeroes them in place.
#[derive(Debug, Default)]
pub struct AccumulatorTable {
    tags: RwLock<HashMap<TagId, Arc<Mutex<TagAccumulator>>>>,
}

impl AccumulatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the tag's accumulator, creating a zeroed one on first sight.
    pub fn entry(&self, tag: &TagId) -> Arc<Mutex<TagAccumulator>> {
        if let Some(existing) = self.tags.read().get(tag) {
            return Arc::clone(existing);
        }
        let mut tags = self.tags.write();
        Arc::clone(tags.entry(tag.clone()).or_default())
    }

    /// Copy of the tag's current state.
    pub fn snapshot(&self, tag: &TagId) -> Option<TagAccumulator> {
        self.tags.read().get(tag).map(|acc| *acc.lock())
    }

    pub fn tags(&self) -> Vec<TagId> {
        let mut tags: Vec<TagId> = self.tags.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.tags.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_weighted_mean_floors() {
        let mut acc = TagAccumulator::default();
        acc.accumulate(1.0, 100, 0);
        acc.accumulate(2.0, 101, 9);
        // x = (100 + 202) / 3 = 100.67 -> 100, y = 18 / 3 = 6
        assert_eq!(acc.estimate(), FusedPosition::Position { x_cm: 100, y_cm: 6 });
        assert_eq!(acc.observations, 2);
    }

    #[test]
    fn test_floor_not_round() {
        let mut acc = TagAccumulator::default();
        acc.accumulate(1.0, 10, 20);
        acc.accumulate(1.0, 11, 21);
        // 10.5 and 20.5 floor down
        assert_eq!(acc.estimate(), FusedPosition::Position { x_cm: 10, y_cm: 20 });
    }

    #[test]
    fn test_negative_mean_floors_toward_negative_infinity() {
        let mut acc = TagAccumulator::default();
        acc.accumulate(1.0, -10, 0);
        acc.accumulate(1.0, -11, 0);
        assert_eq!(acc.estimate(), FusedPosition::Position { x_cm: -11, y_cm: 0 });
    }

    #[test]
    fn test_zero_confidence_is_invalid() {
        let mut acc = TagAccumulator::default();
        assert_eq!(acc.estimate(), FusedPosition::Invalid(InvalidReason::ZeroConfidence));
        acc.accumulate(0.0, 250, 250);
        assert_eq!(acc.estimate(), FusedPosition::Invalid(InvalidReason::ZeroConfidence));
    }

    #[test]
    fn test_reset_zeroes_in_place() {
        let table = AccumulatorTable::new();
        let tag = TagId::new("E280116060000209");
        {
            let entry = table.entry(&tag);
            let mut acc = entry.lock();
            acc.accumulate(1.5, 10, 10);
            acc.reset();
        }
        let snap = table.snapshot(&tag).unwrap();
        assert!(snap.is_empty());
        assert_relative_eq!(snap.confidence_sum, 0.0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_entry_is_shared() {
        let table = AccumulatorTable::new();
        let tag = TagId::new("E280116060000209");
        let a = table.entry(&tag);
        let b = table.entry(&tag);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.tags(), vec![tag]);
    }
}
