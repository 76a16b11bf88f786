//! Reader control abstraction for TagFusion.

use async_trait::async_trait;
use crate::error::ReaderError;
use crate::types::{ReaderReport, ReaderSettings, SensorId};

/// Abstraction over one connected location array.
///
/// # Implementations
///
/// - **Production**: wraps the vendor reader SDK
/// - **Simulation**: `SimReader`, scripted reports with fault injection
///
/// # Report Flow
///
/// ```text
/// TagFusion                     Reader
///   |-- apply_settings(s) ------->|
///   |-- start() ----------------->|
///   |                             |-- [scan cycles] --+
///   |<-- next_report() -----------|<------------------+
///   |-- stop() ------------------>|
/// ```
#[async_trait]
pub trait ReaderControl: Send + Sync + 'static {
    /// The sensor this reader is attached to.
    fn sensor_id(&self) -> &SensorId;

    /// Opens the session to the reader.
    async fn connect(&self) -> Result<(), ReaderError>;

    /// Applies a full settings value, replacing the current one.
    async fn apply_settings(&self, settings: &ReaderSettings) -> Result<(), ReaderError>;

    /// Restores the reader's factory default settings.
    async fn apply_default_settings(&self) -> Result<(), ReaderError>;

    /// Begins scanning with the applied settings.
    async fn start(&self) -> Result<(), ReaderError>;

    /// Stops scanning. Reports already produced stay available to `next_report`.
    async fn stop(&self) -> Result<(), ReaderError>;

    /// Closes the session.
    async fn disconnect(&self) -> Result<(), ReaderError>;

    /// Receives the next report pushed by the reader.
    ///
    /// # Returns
    /// * `Some(report)` - A report was delivered
    /// * `None` - The report stream was closed (shutdown)
    ///
    /// # Blocking
    /// Pends until a report arrives. Silence is not an error.
    ///
    /// Must be cancel-safe: callers race it against timers in `select!`, and
    /// dropping the future must not lose a report.
    async fn next_report(&self) -> Option<ReaderReport>;
}
