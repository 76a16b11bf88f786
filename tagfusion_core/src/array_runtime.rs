//! Sensor Array Runtime - feeds every array of the fused set into one engine.
//!
//! # Architecture
//!
//! ```text
//!  Reader A ──next_report()──► feed task A ──┐
//!  Reader B ──next_report()──► feed task B ──┼──► FusionEngine ──► estimates (mpsc)
//!  Reader N ──next_report()──► feed task N ──┘   (trigger = last array)
//! ```
//!
//! Each array gets its own task, so the engine sees genuinely concurrent
//! producers. Location reports become [`LocationEvent`]s tagged with whether
//! they came from the trigger array; diagnostics update cycle times.
//!
//! # Usage
//!
//! ```ignore
//! let runtime = SensorArrayRuntime::new(ctx, engine, config, array, readers, sink)?;
//! let mut estimates = runtime.launch().await;
//! while let Some(estimate) = estimates.recv().await {
//!     println!("{} {}", estimate.tag, estimate.position);
//! }
//! runtime.shutdown().await;
//! ```

use crate::completion::{CompletionPolicy, TriggerSensor};
use crate::config::{ConfigError, FusionConfig};
use crate::events::{FusedEstimate, LocationEvent};
use crate::fusion::FusionEngine;
use crate::sensor::SensorArray;
use crate::sink::{absorb, FailureSink};
use std::sync::Arc;
use tagfusion_env::{FusionContext, ReaderControl, ReaderOp, ReaderReport, SensorId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs a fixed set of arrays in location mode against one fusion engine.
pub struct SensorArrayRuntime<Ctx, R, P = TriggerSensor>
where
    Ctx: FusionContext,
    R: ReaderControl,
    P: CompletionPolicy + 'static,
{
    context: Arc<Ctx>,
    engine: Arc<FusionEngine<P>>,
    config: FusionConfig,
    array: SensorArray,
    /// One reader per array, in array order
    readers: Vec<Arc<R>>,
    sink: Arc<dyn FailureSink>,
    cancel: CancellationToken,
}

impl<Ctx, R, P> SensorArrayRuntime<Ctx, R, P>
where
    Ctx: FusionContext,
    R: ReaderControl,
    P: CompletionPolicy + 'static,
{
    /// Pairs each array with its reader. Readers must be in array order.
    pub fn new(
        context: Arc<Ctx>,
        engine: Arc<FusionEngine<P>>,
        config: FusionConfig,
        array: SensorArray,
        readers: Vec<Arc<R>>,
        sink: Arc<dyn FailureSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if readers.len() != array.len() {
            return Err(ConfigError::ReaderCount {
                expected: array.len(),
                actual: readers.len(),
            });
        }
        for (index, (sensor, reader)) in array.iter().zip(&readers).enumerate() {
            if reader.sensor_id() != &sensor.id {
                return Err(ConfigError::ReaderMismatch {
                    index,
                    sensor: sensor.id.to_string(),
                    reader: reader.sensor_id().to_string(),
                });
            }
        }

        Ok(Self {
            context,
            engine,
            config,
            array,
            readers,
            sink,
            cancel: CancellationToken::new(),
        })
    }

    pub fn engine(&self) -> &Arc<FusionEngine<P>> {
        &self.engine
    }

    pub fn array(&self) -> &SensorArray {
        &self.array
    }

    /// Connects, configures and starts every array, then spawns one feed
    /// task per started array.
    ///
    /// An array that cannot be connected is skipped; failures after connecting
    /// are reported and the array is fed anyway.
    pub async fn launch(&self) -> mpsc::UnboundedReceiver<FusedEstimate> {
        let (tx, rx) = mpsc::unbounded_channel();

        for (sensor, reader) in self.array.iter().zip(&self.readers) {
            let id = &sensor.id;
            if !absorb(self.sink.as_ref(), id, ReaderOp::Connect, reader.connect().await) {
                continue;
            }

            let settings = self.config.settings_for(sensor);
            absorb(
                self.sink.as_ref(),
                id,
                ReaderOp::ApplySettings,
                reader.apply_settings(&settings).await,
            );
            absorb(self.sink.as_ref(), id, ReaderOp::Start, reader.start().await);

            let from_trigger = self.array.is_trigger(id);
            info!(
                sensor = %id,
                height_cm = sensor.placement.height_cm,
                facility_x_cm = sensor.placement.facility_x_cm,
                facility_y_cm = sensor.placement.facility_y_cm,
                session = %sensor.session,
                trigger = from_trigger,
                "array launched in location mode"
            );

            self.context.spawn(
                &format!("feed-{}", id),
                feed(
                    id.clone(),
                    from_trigger,
                    Arc::clone(reader),
                    Arc::clone(&self.engine),
                    tx.clone(),
                    self.cancel.child_token(),
                ),
            );
        }

        rx
    }

    /// Stops every feed, restores reader defaults and disconnects.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        for reader in &self.readers {
            let id = reader.sensor_id();
            absorb(
                self.sink.as_ref(),
                id,
                ReaderOp::ApplyDefaultSettings,
                reader.apply_default_settings().await,
            );
            absorb(self.sink.as_ref(), id, ReaderOp::Disconnect, reader.disconnect().await);
        }
        info!(arrays = self.readers.len(), "array runtime shut down");
    }
}

/// Forwards one reader's report stream into the engine until cancelled or
/// the stream closes.
async fn feed<R, P>(
    sensor: SensorId,
    from_trigger: bool,
    reader: Arc<R>,
    engine: Arc<FusionEngine<P>>,
    estimates: mpsc::UnboundedSender<FusedEstimate>,
    cancel: CancellationToken,
) where
    R: ReaderControl,
    P: CompletionPolicy,
{
    loop {
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            report = reader.next_report() => report,
        };

        match report {
            Some(ReaderReport::Location(location)) => {
                let event = LocationEvent::from_report(sensor.clone(), location, from_trigger);
                if let Some(estimate) = engine.ingest_location(&event) {
                    // Receiver gone means nobody is listening; keep fusing.
                    let _ = estimates.send(estimate);
                }
            }
            Some(ReaderReport::Diagnostic(diagnostic)) => {
                engine.ingest_diagnostic_report(&sensor, &diagnostic);
            }
            Some(ReaderReport::Inventory(_)) => {}
            None => break,
        }
    }
    debug!(sensor = %sensor, "feed stopped");
}
