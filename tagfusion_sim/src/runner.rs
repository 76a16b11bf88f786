//! Scenario runner - drives the fusion engine and the duty-cycle scheduler
//! against simulated readers on a virtual clock.

use crate::context::SimContext;
use crate::exporter::{EstimateRecord, FailureRecord, SimExport};
use crate::oracle::Oracle;
use crate::reader::SimReader;
use crate::scenarios::ScenarioId;

use std::sync::Arc;
use std::time::Duration;
use tagfusion_core::{
    ConfigError, DutyCycleScheduler, FailureSink, FusedEstimate, FusionEngine, RecordingSink,
    ScheduleReport, Sensor, SensorArray, SensorArrayRuntime, TagFusionConfig,
};
use tagfusion_env::{
    FusionContext, ReaderError, ReaderOp, ReaderReport, SensorId, Session, SpatialMode,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Mean reader cycle time reported by simulated arrays.
const CYCLE_MICROS: u32 = 2_000_000;

/// Fused RMS error above which the fusion scenario fails.
const MAX_RMS_ERROR_CM: f64 = 100.0;

/// The two-array deployment used when no config file is given.
pub fn sample_config() -> Result<TagFusionConfig, ConfigError> {
    let sensors = SensorArray::new(vec![
        Sensor::new("xarray-a", 300, 0, 0, 0, Session(2)),
        Sensor::new("xarray-b", 300, 0, 400, 0, Session(3)),
    ])?;
    Ok(TagFusionConfig {
        fusion: Default::default(),
        scheduler: Default::default(),
        sensors,
    })
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Everything needed to write the run to disk
    pub export: SimExport,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Fused estimates emitted by the engine
    pub estimates: u64,

    /// Estimates marked invalid (zero confidence)
    pub invalid_estimates: u64,

    /// RMS error of valid estimates vs ground truth
    pub rms_error_cm: Option<f64>,

    /// Discovery and location windows run
    pub phases: u64,

    /// Persistence decay waits entered
    pub decay_waits: u64,

    /// Reader failures routed to the failure sink
    pub reader_failures: u64,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Deployment under test
    config: TagFusionConfig,

    /// Fusion rounds (one full report cycle from every array per round)
    rounds: u32,

    /// Simulated tag population
    num_tags: usize,
}

impl ScenarioRunner {
    pub fn new(seed: u64, config: TagFusionConfig) -> Self {
        Self {
            seed,
            config,
            rounds: 5,
            num_tags: 25,
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    pub fn with_tags(mut self, num_tags: usize) -> Self {
        self.num_tags = num_tags.max(1);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                return self.aborted(scenario, format!("Failed to build runtime: {}", e));
            }
        };

        runtime.block_on(async {
            match scenario {
                ScenarioId::Fusion => self.run_fusion().await,
                ScenarioId::DutyCycle => self.run_duty_cycle().await,
                ScenarioId::FlakyReader => self.run_flaky_reader().await,
            }
        })
    }

    /// SIM-001: every array reports every tag once per round; the trigger
    /// array reports last so each round closes one fusion cycle per tag.
    ///
    /// **Assertion**: one valid estimate per tag per round, RMS error below
    /// `MAX_RMS_ERROR_CM`.
    async fn run_fusion(&self) -> ScenarioResult {
        let scenario = ScenarioId::Fusion;
        info!("SIM-001: Fusion - {} arrays, {} tags, {} rounds",
              self.config.sensors.len(), self.num_tags, self.rounds);

        let ctx = SimContext::shared();
        let engine = match FusionEngine::new(&self.config.fusion) {
            Ok(engine) => Arc::new(engine),
            Err(e) => return self.aborted(scenario, format!("Invalid fusion config: {}", e)),
        };
        let readers: Vec<Arc<SimReader>> = self
            .config
            .sensors
            .iter()
            .map(|sensor| Arc::new(SimReader::new(sensor.id.clone())))
            .collect();
        let sink = Arc::new(RecordingSink::new());
        let failure_sink: Arc<dyn FailureSink> = sink.clone();

        let array_runtime = match SensorArrayRuntime::new(
            Arc::clone(&ctx),
            engine,
            self.config.fusion.clone(),
            self.config.sensors.clone(),
            readers.clone(),
            failure_sink,
        ) {
            Ok(runtime) => runtime,
            Err(e) => return self.aborted(scenario, format!("Invalid deployment: {}", e)),
        };

        let mut oracle = Oracle::new(self.seed);
        oracle.set_position_noise(30.0);
        oracle.spawn_random_tags(self.num_tags, 1200.0, 1200.0);

        let mut estimates = array_runtime.launch().await;
        let mut export = SimExport::new(scenario.name(), self.seed);
        let mut metrics = ScenarioMetrics::default();
        let mut squared_error = 0.0;
        let mut failure_reason = None;

        // Non-trigger arrays first, then the trigger array.
        let (trigger, others) = match readers.split_last() {
            Some(split) => split,
            None => return self.aborted(scenario, "No readers".to_string()),
        };

        for round in 1..=self.rounds {
            for reader in others {
                self.feed_cycle(&mut oracle, reader).await;
            }
            self.feed_cycle(&mut oracle, trigger).await;
            ctx.advance_time(Duration::from_secs(u64::from(
                self.config.fusion.update_interval_secs,
            )));

            let mut emitted = 0;
            while let Ok(estimate) = estimates.try_recv() {
                emitted += 1;
                let Some(truth) = oracle.ground_truth(&estimate.tag) else {
                    warn!(tag = %estimate.tag, "estimate for unknown tag");
                    continue;
                };
                let record = EstimateRecord::new(estimate, truth);
                record_estimate(&record.estimate, &mut metrics);
                if let Some(error) = record.error_cm {
                    squared_error += error * error;
                }
                export.add_estimate(record);
            }
            debug!(round, emitted, "fusion round complete");

            if emitted != self.num_tags && failure_reason.is_none() {
                failure_reason = Some(format!(
                    "Round {}: expected {} estimates, got {}",
                    round, self.num_tags, emitted
                ));
            }
        }

        array_runtime.shutdown().await;

        let valid = metrics.estimates - metrics.invalid_estimates;
        let rms = (valid > 0).then(|| (squared_error / valid as f64).sqrt());
        metrics.rms_error_cm = rms;
        metrics.reader_failures = sink.count() as u64;

        if failure_reason.is_none() && metrics.invalid_estimates > 0 {
            failure_reason = Some(format!("{} invalid estimates", metrics.invalid_estimates));
        }
        if failure_reason.is_none() {
            if let Some(rms) = rms.filter(|rms| *rms >= MAX_RMS_ERROR_CM) {
                failure_reason = Some(format!(
                    "RMS error {:.1}cm exceeds {:.0}cm",
                    rms, MAX_RMS_ERROR_CM
                ));
            }
        }
        let disconnected = readers.iter().all(|reader| !reader.is_connected());
        if failure_reason.is_none() && !disconnected {
            failure_reason = Some("Readers still connected after shutdown".to_string());
        }

        info!("✓ Fusion complete: {} estimates, RMS error: {}",
              metrics.estimates,
              rms.map(|r| format!("{:.1}cm", r)).unwrap_or_else(|| "n/a".to_string()));

        self.finish(scenario, &ctx, metrics, failure_reason, export, sink.as_ref())
    }

    /// SIM-002: the scheduler runs its configured iterations with nothing
    /// going wrong.
    ///
    /// **Assertion**: every window runs, decay waits only on persistent
    /// sessions, virtual time equals the sum of all windows and waits.
    async fn run_duty_cycle(&self) -> ScenarioResult {
        let scenario = ScenarioId::DutyCycle;
        info!("SIM-002: DutyCycle - {} iterations", self.config.scheduler.iterations);

        let reader = Arc::new(SimReader::new(self.duty_sensor()));
        let mut oracle = Oracle::new(self.seed);
        oracle.spawn_random_tags(self.num_tags, 1200.0, 1200.0);
        self.queue_windows(&mut oracle, &reader);

        let (ctx, sink, report) = match self.schedule(&reader).await {
            Ok(outcome) => outcome,
            Err(e) => return self.aborted(scenario, format!("Invalid scheduler config: {}", e)),
        };
        let mut failure_reason = self.check_schedule(&ctx, &report);
        if failure_reason.is_none() && sink.count() > 0 {
            failure_reason = Some(format!("{} unexpected reader failures", sink.count()));
        }

        let metrics = schedule_metrics(&report, &sink);
        let mut export = SimExport::new(scenario.name(), self.seed);
        export.phases = report.phases;

        info!("✓ DutyCycle complete: {} phases, {} decay waits, {:.0}s virtual",
              metrics.phases, metrics.decay_waits, ctx.now().as_secs_f64());

        self.finish(scenario, &ctx, metrics, failure_reason, export, sink.as_ref())
    }

    /// SIM-003: settings and start calls fail and stop always fails.
    ///
    /// **Assertion**: the schedule still completes, every failure reaches the
    /// sink, and the reader ends on factory defaults and disconnected.
    async fn run_flaky_reader(&self) -> ScenarioResult {
        let scenario = ScenarioId::FlakyReader;
        info!("SIM-003: FlakyReader - injected settings/start/stop failures");

        let reader = Arc::new(SimReader::new(self.duty_sensor()));
        let mut oracle = Oracle::new(self.seed);
        oracle.spawn_random_tags(self.num_tags, 1200.0, 1200.0);
        self.queue_windows(&mut oracle, &reader);

        reader.fail_next(ReaderOp::ApplySettings, ReaderError::configuration("bad beam set"));
        reader.fail_next(ReaderOp::Start, ReaderError::Sdk("antenna hub fault".to_string()));
        reader.fail_next(ReaderOp::Start, ReaderError::Sdk("antenna hub fault".to_string()));
        reader.fail_always(ReaderOp::Stop, ReaderError::Sdk("stop rejected".to_string()));

        let (ctx, sink, report) = match self.schedule(&reader).await {
            Ok(outcome) => outcome,
            Err(e) => return self.aborted(scenario, format!("Invalid scheduler config: {}", e)),
        };
        let mut failure_reason = self.check_schedule(&ctx, &report);

        let windows = 2 * self.config.scheduler.iterations as usize;
        let expected_failures = 1 + 2 + windows;
        if failure_reason.is_none() && sink.count() != expected_failures {
            failure_reason = Some(format!(
                "Expected {} reader failures, sink saw {}",
                expected_failures,
                sink.count()
            ));
        }
        if failure_reason.is_none()
            && (reader.is_connected() || reader.current_settings().is_some())
        {
            failure_reason = Some("Reader not restored and disconnected".to_string());
        }
        if failure_reason.is_none() && reader.ops().last() != Some(&ReaderOp::Disconnect) {
            failure_reason = Some("Last reader call was not disconnect".to_string());
        }

        let metrics = schedule_metrics(&report, &sink);
        let mut export = SimExport::new(scenario.name(), self.seed);
        export.phases = report.phases;

        info!("✓ FlakyReader complete: {} failures absorbed, {} iterations",
              metrics.reader_failures, report.iterations_completed);

        self.finish(scenario, &ctx, metrics, failure_reason, export, sink.as_ref())
    }

    /// Pushes one report cycle from `reader` and waits until its feed task
    /// has consumed all of it.
    async fn feed_cycle(&self, oracle: &mut Oracle, reader: &SimReader) {
        reader.push_report(ReaderReport::Diagnostic(oracle.cycle_diagnostic(CYCLE_MICROS)));
        for report in oracle.location_reports(15) {
            reader.push_report(ReaderReport::Location(report));
        }
        while reader.pending() > 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Queues one discovery batch and one location batch per iteration.
    fn queue_windows(&self, oracle: &mut Oracle, reader: &SimReader) {
        for _ in 0..self.config.scheduler.iterations {
            let sightings = oracle
                .inventory_sightings(0.9)
                .into_iter()
                .map(ReaderReport::Inventory)
                .collect();
            reader.queue_batch(SpatialMode::Inventory, sightings);

            let locations = oracle
                .location_reports(10)
                .into_iter()
                .map(ReaderReport::Location)
                .collect();
            reader.queue_batch(SpatialMode::Location, locations);
        }
    }

    async fn schedule(
        &self,
        reader: &Arc<SimReader>,
    ) -> Result<(Arc<SimContext>, Arc<RecordingSink>, ScheduleReport), ConfigError> {
        let ctx = SimContext::shared();
        let sink = Arc::new(RecordingSink::new());
        let scheduler = DutyCycleScheduler::new(
            Arc::clone(&ctx),
            Arc::clone(reader),
            self.config.scheduler.clone(),
            sink.clone(),
        )?;
        let report = scheduler.run(CancellationToken::new()).await;
        Ok((ctx, sink, report))
    }

    fn check_schedule(&self, ctx: &SimContext, report: &ScheduleReport) -> Option<String> {
        let config = &self.config.scheduler;
        let iterations = config.iterations;
        let expected_waits = if config.discovery.session.is_persistent() {
            iterations - 1
        } else {
            0
        };
        let expected_time = (config.discovery_duration() + config.location.duration())
            * iterations
            + config.persistence_decay() * expected_waits;

        if report.cancelled {
            Some("Schedule reported cancellation".to_string())
        } else if report.iterations_completed != iterations {
            Some(format!(
                "Completed {} of {} iterations",
                report.iterations_completed, iterations
            ))
        } else if report.phases.len() != 2 * iterations as usize {
            Some(format!("Ran {} phases", report.phases.len()))
        } else if report.decay_waits != expected_waits {
            Some(format!(
                "Expected {} decay waits, got {}",
                expected_waits, report.decay_waits
            ))
        } else if ctx.now() != expected_time {
            Some(format!(
                "Virtual time {:?}, expected {:?}",
                ctx.now(),
                expected_time
            ))
        } else {
            None
        }
    }

    fn duty_sensor(&self) -> SensorId {
        self.config.sensors.trigger().id.clone()
    }

    fn finish(
        &self,
        scenario: ScenarioId,
        ctx: &SimContext,
        metrics: ScenarioMetrics,
        failure_reason: Option<String>,
        mut export: SimExport,
        sink: &RecordingSink,
    ) -> ScenarioResult {
        let passed = failure_reason.is_none();
        if let Some(reason) = &failure_reason {
            warn!("✗ {} failed: {}", scenario.name(), reason);
        }

        export.virtual_time_sec = ctx.now().as_secs_f64();
        export.failures = sink.failures().iter().map(FailureRecord::from).collect();
        export.finalize(passed, metrics.rms_error_cm);

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            final_time_secs: ctx.now().as_secs_f64(),
            failure_reason,
            metrics,
            export,
        }
    }

    fn aborted(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        warn!("✗ {} aborted: {}", scenario.name(), reason);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            export: SimExport::new(scenario.name(), self.seed),
        }
    }
}

fn record_estimate(estimate: &FusedEstimate, metrics: &mut ScenarioMetrics) {
    metrics.estimates += 1;
    if !estimate.position.is_valid() {
        metrics.invalid_estimates += 1;
    }
}

fn schedule_metrics(report: &ScheduleReport, sink: &RecordingSink) -> ScenarioMetrics {
    ScenarioMetrics {
        phases: report.phases.len() as u64,
        decay_waits: u64::from(report.decay_waits),
        reader_failures: sink.count() as u64,
        ..ScenarioMetrics::default()
    }
}
