//! TagFusion Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the TagFusion engines
//! run against real location arrays (tokio) and against the deterministic
//! simulation harness.
//!
//! # Core Concept
//!
//! Everything the engines cannot control is intercepted behind a trait:
//! - Time (`now()`, `sleep()`) and task spawning via [`FusionContext`]
//! - The physical reader (configure, start/stop, report stream) via [`ReaderControl`]
//!
//! # Example
//!
//! ```ignore
//! use tagfusion_env::{FusionContext, ReaderControl, ReaderReport};
//!
//! async fn collect<Ctx: FusionContext, R: ReaderControl>(ctx: &Ctx, reader: &R) {
//!     let hold = ctx.sleep(Duration::from_secs(30));
//!     tokio::pin!(hold);
//!     loop {
//!         tokio::select! {
//!             biased;
//!             Some(report) = reader.next_report() => handle(report),
//!             _ = &mut hold => break,
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod reader;
mod tokio_impl;
mod types;

pub use context::FusionContext;
pub use error::{ReaderError, ReaderOp};
pub use reader::ReaderControl;
pub use tokio_impl::TokioContext;
pub use types::{
    AntennaSelection, DiagnosticReport, LocationReport, LocationReporting, Placement, ReaderMode,
    ReaderReport, ReaderSettings, SearchMode, SensorId, Session, SpatialMode, TagId, TagSighting,
    END_OF_CYCLE_METRIC,
};
