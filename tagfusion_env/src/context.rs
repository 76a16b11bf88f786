//! Core environment context trait for TagFusion engines.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for interaction with time and the task runtime.
///
/// The duty-cycle scheduler spends nearly all of its life suspended, so
/// routing every suspension through this trait is what makes a two-hour
/// monitoring schedule testable in microseconds.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Simulation**: `SimContext` - virtual clock advanced by `sleep`
#[async_trait]
pub trait FusionContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// The name is used for tracing only.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
