//! TagFusion Core - confidence-weighted tag location across multiple arrays
//!
//! This library covers the two pieces of a multi-array RFID location
//! deployment that carry real logic:
//! 1. **Fusion**: per-array positions weighted by read-count confidence and
//!    combined into one estimate per tag
//! 2. **Duty cycle**: a single array alternated between wide-area discovery
//!    and precision location on a fixed schedule
//!
//! Readers, time and task spawning are reached through `tagfusion_env`.

pub mod accumulator;
pub mod array_runtime;
pub mod completion;
pub mod confidence;
pub mod config;
pub mod cycle_table;
pub mod events;
pub mod fusion;
pub mod scheduler;
pub mod sensor;
pub mod sink;

// Re-export key types for convenience
pub use array_runtime::SensorArrayRuntime;
pub use completion::{CompletionPolicy, TriggerSensor};
pub use config::{ConfigError, FusionConfig, SchedulerConfig, TagFusionConfig};
pub use events::{DiagnosticEvent, FusedEstimate, FusedPosition, InvalidReason, LocationEvent};
pub use fusion::FusionEngine;
pub use scheduler::{
    DutyCycleScheduler, PhaseResults, PhaseSummary, RoleMode, ScheduleReport, SchedulerState,
};
pub use sensor::{Sensor, SensorArray};
pub use sink::{FailureSink, ReaderFailure, RecordingSink, TracingSink};
