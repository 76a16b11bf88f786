//! Duty-Cycle Role Scheduler - alternates one array between discovery and location
//!
//! ```text
//!            ┌──────────────── iterations remain ─────────────────┐
//!            ▼                                                    │
//! Idle ─► Discovery ─► Location ─┬─► [DecayWait if persistent] ───┘
//!                                └─► Idle (defaults restored, disconnected)
//! ```
//!
//! The loop is strictly sequential. It suspends at three points: end of
//! discovery, end of location and the decay wait. A cancellation token is
//! checked at each of them; on cancellation the reader is stopped and the
//! terminal restore/disconnect still runs.
//!
//! Reader failures are routed to the failure sink and never change the
//! schedule.

use crate::config::{ConfigError, SchedulerConfig};
use crate::sink::{absorb, FailureSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tagfusion_env::{
    FusionContext, LocationReport, ReaderControl, ReaderError, ReaderOp, ReaderReport,
    ReaderSettings, TagId, TagSighting,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Operating role of the array during one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleMode {
    Discovery,
    Location,
}

/// Where the control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Discovery { iteration: u32 },
    Location { iteration: u32 },
    DecayWait { iteration: u32 },
}

/// A time-boxed operating window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleWindow {
    pub mode: RoleMode,
    pub duration: Duration,
}

/// Last observation per tag from one window, sorted by tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhaseResults {
    Discovery(Vec<TagSighting>),
    Location(Vec<LocationReport>),
}

impl PhaseResults {
    pub fn len(&self) -> usize {
        match self {
            PhaseResults::Discovery(sightings) => sightings.len(),
            PhaseResults::Location(reports) => reports.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sightings(&self) -> &[TagSighting] {
        match self {
            PhaseResults::Discovery(sightings) => sightings,
            PhaseResults::Location(_) => &[],
        }
    }

    pub fn locations(&self) -> &[LocationReport] {
        match self {
            PhaseResults::Discovery(_) => &[],
            PhaseResults::Location(reports) => reports,
        }
    }

    fn tags(&self) -> Vec<TagId> {
        match self {
            PhaseResults::Discovery(sightings) => sightings.iter().map(|s| s.tag.clone()).collect(),
            PhaseResults::Location(reports) => reports.iter().map(|r| r.tag.clone()).collect(),
        }
    }
}

/// Tags collected during one window (last observation per tag wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// 1-based iteration number
    pub iteration: u32,
    pub mode: RoleMode,
    /// Distinct tags observed, sorted
    pub tags: Vec<TagId>,
    pub results: PhaseResults,
    /// The window was cut short by cancellation
    pub interrupted: bool,
}

impl PhaseSummary {
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

/// Outcome of a full scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub phases: Vec<PhaseSummary>,
    pub iterations_completed: u32,
    pub decay_waits: u32,
    pub cancelled: bool,
}

/// How a suspension ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Elapsed,
    Cancelled,
}

/// Runs the discovery/location duty cycle against a single reader.
pub struct DutyCycleScheduler<Ctx, R>
where
    Ctx: FusionContext,
    R: ReaderControl,
{
    context: Arc<Ctx>,
    reader: Arc<R>,
    config: SchedulerConfig,
    sink: Arc<dyn FailureSink>,
    state: watch::Sender<SchedulerState>,
}

impl<Ctx, R> DutyCycleScheduler<Ctx, R>
where
    Ctx: FusionContext,
    R: ReaderControl,
{
    /// Rejects configs with no iterations or a zero location window before
    /// any reader call is made.
    pub fn new(
        context: Arc<Ctx>,
        reader: Arc<R>,
        config: SchedulerConfig,
        sink: Arc<dyn FailureSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(SchedulerState::Idle);
        Ok(Self {
            context,
            reader,
            config,
            sink,
            state,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Runs every configured iteration, then restores defaults and disconnects.
    pub async fn run(&self, cancel: CancellationToken) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        let iterations = self.config.iterations;

        self.call(ReaderOp::Connect, self.reader.connect().await);
        info!(
            sensor = %self.reader.sensor_id(),
            iterations,
            "starting discovery/location duty cycle"
        );

        for iteration in 1..=iterations {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let discovery = self.run_discovery(iteration, &cancel).await;
            let interrupted = discovery.interrupted;
            report.phases.push(discovery);
            if interrupted {
                report.cancelled = true;
                break;
            }

            let location = self.run_location(iteration, &cancel).await;
            let interrupted = location.interrupted;
            report.phases.push(location);
            if interrupted {
                report.cancelled = true;
                break;
            }
            report.iterations_completed += 1;

            if iteration < iterations && self.config.discovery.session.is_persistent() {
                self.set_state(SchedulerState::DecayWait { iteration });
                report.decay_waits += 1;
                let decay = self.config.persistence_decay();
                info!(
                    wait_secs = decay.as_secs(),
                    session = %self.config.discovery.session,
                    "waiting for tag persistence to decay before restarting discovery"
                );
                if self.hold(decay, &cancel).await == Hold::Cancelled {
                    report.cancelled = true;
                    break;
                }
            }
        }

        self.release().await;
        self.set_state(SchedulerState::Idle);
        report
    }

    async fn run_discovery(&self, iteration: u32, cancel: &CancellationToken) -> PhaseSummary {
        let window = RoleWindow {
            mode: RoleMode::Discovery,
            duration: self.config.discovery_duration(),
        };
        self.set_state(SchedulerState::Discovery { iteration });
        info!(
            iteration,
            wait_secs = window.duration.as_secs(),
            session = %self.config.discovery.session,
            search_mode = ?self.config.discovery.search_mode,
            "running discovery"
        );

        let settings = self.config.discovery_settings();
        let (sightings, hold) = self
            .collect(window, &settings, cancel, |report| match report {
                ReaderReport::Inventory(sighting) => Some(sighting),
                _ => None,
            })
            .await;

        let sightings = sorted_by_tag(sightings);
        for sighting in &sightings {
            let TagSighting { tag, antenna_port, peak_rssi_dbm } = sighting;
            debug!(%tag, antenna_port, peak_rssi_dbm, "discovered");
        }
        self.summarize(iteration, window.mode, PhaseResults::Discovery(sightings), hold)
    }

    async fn run_location(&self, iteration: u32, cancel: &CancellationToken) -> PhaseSummary {
        let window = RoleWindow {
            mode: RoleMode::Location,
            duration: self.config.location.duration(),
        };
        self.set_state(SchedulerState::Location { iteration });
        info!(iteration, wait_secs = window.duration.as_secs(), "running location");

        let settings = self.config.location_settings();
        let (reports, hold) = self
            .collect(window, &settings, cancel, |report| match report {
                ReaderReport::Location(location) => Some(location),
                _ => None,
            })
            .await;

        let reports = sorted_by_tag(reports);
        for report in &reports {
            let LocationReport { tag, x_cm, y_cm, read_count } = report;
            debug!(%tag, read_count, x = x_cm, y = y_cm, "located");
        }
        self.summarize(iteration, window.mode, PhaseResults::Location(reports), hold)
    }

    /// Applies `settings`, starts the reader, keeps the last report per tag
    /// until the window ends, then stops the reader.
    ///
    /// Reports already waiting are drained before the window deadline is
    /// checked, so a reader that delivers in bursts is never cut off mid-burst.
    async fn collect<T, F>(
        &self,
        window: RoleWindow,
        settings: &ReaderSettings,
        cancel: &CancellationToken,
        pick: F,
    ) -> (HashMap<TagId, T>, Hold)
    where
        T: HasTag,
        F: Fn(ReaderReport) -> Option<T>,
    {
        self.call(ReaderOp::ApplySettings, self.reader.apply_settings(settings).await);
        self.call(ReaderOp::Start, self.reader.start().await);

        let mut collected = HashMap::new();
        let deadline = self.context.now() + window.duration;
        let elapsed = self.context.sleep(window.duration);
        tokio::pin!(elapsed);

        let hold = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Hold::Cancelled,
                report = self.reader.next_report() => match report {
                    Some(report) => {
                        if let Some(observation) = pick(report) {
                            collected.insert(observation.tag().clone(), observation);
                        }
                        if self.context.now() >= deadline {
                            break Hold::Elapsed;
                        }
                    }
                    // Stream closed; sit out the rest of the window.
                    None => break tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Hold::Cancelled,
                        _ = &mut elapsed => Hold::Elapsed,
                    },
                },
                _ = &mut elapsed => break Hold::Elapsed,
            }
        };

        self.call(ReaderOp::Stop, self.reader.stop().await);
        (collected, hold)
    }

    fn summarize(
        &self,
        iteration: u32,
        mode: RoleMode,
        results: PhaseResults,
        hold: Hold,
    ) -> PhaseSummary {
        let summary = PhaseSummary {
            iteration,
            mode,
            tags: results.tags(),
            results,
            interrupted: hold == Hold::Cancelled,
        };
        info!(
            iteration,
            mode = ?mode,
            tags_read = summary.tag_count(),
            interrupted = summary.interrupted,
            "phase results"
        );
        summary
    }

    async fn hold(&self, duration: Duration, cancel: &CancellationToken) -> Hold {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Hold::Cancelled,
            _ = self.context.sleep(duration) => Hold::Elapsed,
        }
    }

    async fn release(&self) {
        self.call(
            ReaderOp::ApplyDefaultSettings,
            self.reader.apply_default_settings().await,
        );
        self.call(ReaderOp::Disconnect, self.reader.disconnect().await);
    }

    fn call(&self, op: ReaderOp, result: Result<(), ReaderError>) {
        absorb(self.sink.as_ref(), self.reader.sensor_id(), op, result);
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }
}

fn sorted_by_tag<T>(collected: HashMap<TagId, T>) -> Vec<T> {
    let mut entries: Vec<(TagId, T)> = collected.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, observation)| observation).collect()
}

/// Observations keyed by the tag they describe.
trait HasTag {
    fn tag(&self) -> &TagId;
}

impl HasTag for TagSighting {
    fn tag(&self) -> &TagId {
        &self.tag
    }
}

impl HasTag for LocationReport {
    fn tag(&self) -> &TagId {
        &self.tag
    }
}
