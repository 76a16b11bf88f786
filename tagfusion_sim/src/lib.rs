//! TagFusion Deterministic Simulation Harness
//!
//! Runs the fusion engine and the duty-cycle scheduler against scripted
//! readers on a virtual clock, so whole schedules finish instantly and every
//! run is reproducible from one seed.
//!
//! - **Time**: `SimContext` advances only when something sleeps
//! - **Readers**: `SimReader` replays queued reports and injected failures
//! - **Tags**: `Oracle` owns ground truth and generates noisy reports
//!
//! # Usage
//!
//! ```ignore
//! use tagfusion_sim::{sample_config, ScenarioRunner, ScenarioId};
//!
//! let runner = ScenarioRunner::new(42, sample_config()?);
//! let result = runner.run(ScenarioId::Fusion);
//! assert!(result.passed);
//! ```

pub mod context;
pub mod exporter;
pub mod oracle;
pub mod reader;
pub mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{EstimateRecord, FailureRecord, SimExport};
pub use oracle::{GroundTruthTag, Oracle};
pub use reader::SimReader;
pub use runner::{sample_config, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
