//! Single reporting path for swallowed reader failures.
//!
//! Nothing a reader reports is fatal here: long unattended runs keep their
//! schedule. Every failure still goes through a [`FailureSink`] so callers and
//! tests can observe it without scraping log output.

use parking_lot::Mutex;
use tagfusion_env::{ReaderError, ReaderOp, SensorId};
use tracing::warn;

/// One swallowed collaborator failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderFailure {
    pub sensor: SensorId,
    pub op: ReaderOp,
    pub error: ReaderError,
}

pub trait FailureSink: Send + Sync {
    fn report(&self, failure: ReaderFailure);
}

/// Logs failures at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn report(&self, failure: ReaderFailure) {
        warn!(
            sensor = %failure.sensor,
            op = %failure.op,
            error = %failure.error,
            "reader operation failed, continuing"
        );
    }
}

/// Keeps every failure in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    failures: Mutex<Vec<ReaderFailure>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<ReaderFailure> {
        self.failures.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn count_for(&self, op: ReaderOp) -> usize {
        self.failures.lock().iter().filter(|f| f.op == op).count()
    }
}

impl FailureSink for RecordingSink {
    fn report(&self, failure: ReaderFailure) {
        TracingSink.report(failure.clone());
        self.failures.lock().push(failure);
    }
}

/// Routes a failed result to `sink`. Returns whether the call succeeded.
pub(crate) fn absorb(
    sink: &dyn FailureSink,
    sensor: &SensorId,
    op: ReaderOp,
    result: Result<(), ReaderError>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(error) => {
            sink.report(ReaderFailure {
                sensor: sensor.clone(),
                op,
                error,
            });
            false
        }
    }
}
