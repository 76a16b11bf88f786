//! When does a tag's fusion cycle end?
//!
//! Arrays report independently and the report stream carries no barrier that
//! says "every array has reported for this tag". The default policy treats a
//! report from the trigger sensor (the last configured array) as that barrier.
//! This is a heuristic: if the trigger array reports a tag before the others
//! do, the cycle closes early and the late reports roll into the next cycle.
//! The engine accepts that race rather than inventing an N-array barrier.
//!
//! Other strategies (timeouts, per-array sequence counters) plug in through
//! [`CompletionPolicy`] without touching accumulation.

use crate::accumulator::TagAccumulator;
use crate::events::LocationEvent;

/// Decides whether an event closes the tag's current fusion cycle.
///
/// Called with the tag's lock held, after `event` has been accumulated into
/// `state`.
pub trait CompletionPolicy: Send + Sync {
    fn completes_cycle(&self, event: &LocationEvent, state: &TagAccumulator) -> bool;
}

/// A report from the trigger sensor closes the cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerSensor;

impl CompletionPolicy for TriggerSensor {
    fn completes_cycle(&self, event: &LocationEvent, _state: &TagAccumulator) -> bool {
        event.from_trigger
    }
}

impl<F> CompletionPolicy for F
where
    F: Fn(&LocationEvent, &TagAccumulator) -> bool + Send + Sync,
{
    fn completes_cycle(&self, event: &LocationEvent, state: &TagAccumulator) -> bool {
        self(event, state)
    }
}
