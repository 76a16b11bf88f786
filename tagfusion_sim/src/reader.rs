//! Scripted reader for deterministic simulation.
//!
//! `SimReader` keeps the same contract as a hardware reader: nothing is
//! accepted before `connect`, reports arrive through `next_report`, and
//! `start` releases whatever batch was queued for the applied spatial mode.
//! Tests script failures per operation and can cancel a token the moment a
//! given operation is called.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tagfusion_env::{
    ReaderControl, ReaderError, ReaderOp, ReaderReport, ReaderSettings, SensorId, SpatialMode,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct CancelHook {
    op: ReaderOp,
    /// 1-based call number that fires the hook
    occurrence: usize,
    token: CancellationToken,
}

#[derive(Default)]
struct ReaderState {
    connected: bool,
    running: bool,
    current: Option<ReaderSettings>,
    applied: Vec<ReaderSettings>,
    ops: Vec<ReaderOp>,
    calls: HashMap<ReaderOp, usize>,
    fail_next: HashMap<ReaderOp, VecDeque<ReaderError>>,
    fail_always: HashMap<ReaderOp, ReaderError>,
    batches: HashMap<SpatialMode, VecDeque<Vec<ReaderReport>>>,
    hooks: Vec<CancelHook>,
}

impl ReaderState {
    /// Logs the call, fires hooks and returns the scripted failure, if any.
    fn enter(&mut self, op: ReaderOp) -> Result<(), ReaderError> {
        self.ops.push(op);
        let count = self.calls.entry(op).or_insert(0);
        *count += 1;
        let count = *count;

        for hook in &self.hooks {
            if hook.op == op && hook.occurrence == count {
                hook.token.cancel();
            }
        }

        if let Some(error) = self.fail_next.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if let Some(error) = self.fail_always.get(&op) {
            return Err(error.clone());
        }
        if op != ReaderOp::Connect && !self.connected {
            return Err(ReaderError::NotConnected);
        }
        Ok(())
    }
}

/// In-memory reader driven by the simulation.
pub struct SimReader {
    sensor: SensorId,
    state: Mutex<ReaderState>,
    tx: Mutex<Option<mpsc::UnboundedSender<ReaderReport>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReaderReport>>,
    /// Reports pushed but not yet handed out by `next_report`
    pending: AtomicUsize,
}

impl SimReader {
    pub fn new(sensor: impl Into<SensorId>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sensor: sensor.into(),
            state: Mutex::new(ReaderState::default()),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Delivers a report immediately, regardless of reader state.
    ///
    /// Returns false once the stream has been closed.
    pub fn push_report(&self, report: ReaderReport) -> bool {
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return false;
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(report).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Queues reports to be released by the next successful `start` while
    /// the given spatial mode is applied.
    pub fn queue_batch(&self, mode: SpatialMode, reports: Vec<ReaderReport>) {
        self.state
            .lock()
            .batches
            .entry(mode)
            .or_default()
            .push_back(reports);
    }

    /// Closes the report stream; `next_report` returns `None` once drained.
    pub fn close_stream(&self) {
        self.tx.lock().take();
    }

    /// Fails the next call to `op` with `error`. Calls stack in order.
    pub fn fail_next(&self, op: ReaderOp, error: ReaderError) {
        self.state
            .lock()
            .fail_next
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fails every call to `op` with `error`.
    pub fn fail_always(&self, op: ReaderOp, error: ReaderError) {
        self.state.lock().fail_always.insert(op, error);
    }

    /// Cancels `token` when `op` is called for the `occurrence`-th time.
    pub fn cancel_on(&self, op: ReaderOp, occurrence: usize, token: CancellationToken) {
        self.state.lock().hooks.push(CancelHook {
            op,
            occurrence,
            token,
        });
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Settings currently in effect; `None` means factory defaults.
    pub fn current_settings(&self) -> Option<ReaderSettings> {
        self.state.lock().current.clone()
    }

    /// Every settings value successfully applied, in order.
    pub fn applied_settings(&self) -> Vec<ReaderSettings> {
        self.state.lock().applied.clone()
    }

    /// Every control call made, successful or not, in order.
    pub fn ops(&self) -> Vec<ReaderOp> {
        self.state.lock().ops.clone()
    }
}

#[async_trait]
impl ReaderControl for SimReader {
    fn sensor_id(&self) -> &SensorId {
        &self.sensor
    }

    async fn connect(&self) -> Result<(), ReaderError> {
        let mut state = self.state.lock();
        state.enter(ReaderOp::Connect)?;
        state.connected = true;
        Ok(())
    }

    async fn apply_settings(&self, settings: &ReaderSettings) -> Result<(), ReaderError> {
        let mut state = self.state.lock();
        state.enter(ReaderOp::ApplySettings)?;
        state.current = Some(settings.clone());
        state.applied.push(settings.clone());
        Ok(())
    }

    async fn apply_default_settings(&self) -> Result<(), ReaderError> {
        let mut state = self.state.lock();
        state.enter(ReaderOp::ApplyDefaultSettings)?;
        state.current = None;
        Ok(())
    }

    async fn start(&self) -> Result<(), ReaderError> {
        let batch = {
            let mut state = self.state.lock();
            state.enter(ReaderOp::Start)?;
            state.running = true;
            let mode = state.current.as_ref().map(|s| s.spatial_mode);
            let batch = mode
                .and_then(|mode| state.batches.get_mut(&mode))
                .and_then(VecDeque::pop_front);
            batch
        };
        for report in batch.into_iter().flatten() {
            self.push_report(report);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ReaderError> {
        let mut state = self.state.lock();
        state.enter(ReaderOp::Stop)?;
        state.running = false;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ReaderError> {
        let mut state = self.state.lock();
        state.enter(ReaderOp::Disconnect)?;
        state.connected = false;
        state.running = false;
        Ok(())
    }

    async fn next_report(&self) -> Option<ReaderReport> {
        let report = self.rx.lock().await.recv().await;
        if report.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        report
    }
}
