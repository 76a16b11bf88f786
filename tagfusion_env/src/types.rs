//! Common types shared between TagFusion engines and reader collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic metric code signalling the end of a full scan cycle.
///
/// The metric value that follows it is the cycle duration in microseconds.
pub const END_OF_CYCLE_METRIC: u32 = 100;

/// Identity of a location array, normally its hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a physical tag (EPC rendered as hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    pub fn new(epc_hex: impl Into<String>) -> Self {
        Self(epc_hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagId {
    fn from(epc_hex: &str) -> Self {
        Self::new(epc_hex)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gen2 RF session index (0..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(pub u8);

impl Session {
    /// Sessions 2 and 3 keep a tag's inventoried flag after the reader stops
    /// illuminating it, so tags stay silent until the flag decays.
    pub fn is_persistent(&self) -> bool {
        matches!(self.0, 2 | 3)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reader RF mode preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderMode {
    AutoSetDenseReader,
    AutoSetDenseReaderDeepScan,
    MaxThroughput,
}

/// Gen2 search (target) mode used during inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    DualTarget,
    SingleTarget,
    TagFocus,
}

/// Spatial operating mode of a location array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialMode {
    /// Wide-area inventory over all beams.
    Inventory,
    /// Precision location with periodic location reports.
    Location,
}

/// Which antenna beams are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntennaSelection {
    /// The reader's default beam set.
    Default,
    All,
    Ports(Vec<u16>),
}

/// Mounting of a location array in facility coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Mounting height above floor (cm)
    pub height_cm: i16,

    /// Facility X offset (cm)
    pub facility_x_cm: i32,

    /// Facility Y offset (cm)
    pub facility_y_cm: i32,

    /// Rotation about the vertical axis (degrees)
    pub orientation_deg: i16,
}

/// Timing and report selection while in location mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationReporting {
    /// Window over which reads are averaged into one position (s)
    pub compute_window_secs: u16,

    /// How long a tag stays known after its last read (s)
    pub tag_age_interval_secs: u16,

    /// How often update reports are delivered (s)
    pub update_interval_secs: u16,

    pub entry_reports: bool,
    pub update_reports: bool,
    pub exit_reports: bool,

    /// End-of-cycle diagnostics, required for confidence weighting.
    pub diagnostic_reports: bool,
}

/// A complete settings value handed to [`crate::ReaderControl::apply_settings`].
///
/// Built from the reader defaults each time, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderSettings {
    pub spatial_mode: SpatialMode,
    pub reader_mode: ReaderMode,
    pub search_mode: Option<SearchMode>,
    pub session: Session,
    pub tag_population_estimate: Option<u16>,
    pub antennas: AntennaSelection,
    pub include_antenna_port: bool,
    pub include_peak_rssi: bool,
    pub placement: Option<Placement>,
    pub location: Option<LocationReporting>,
}

impl ReaderSettings {
    /// Inventory settings over every beam, reporting antenna port and peak RSSI.
    pub fn inventory(
        reader_mode: ReaderMode,
        search_mode: SearchMode,
        session: Session,
        tag_population_estimate: u16,
    ) -> Self {
        Self {
            spatial_mode: SpatialMode::Inventory,
            reader_mode,
            search_mode: Some(search_mode),
            session,
            tag_population_estimate: Some(tag_population_estimate),
            antennas: AntennaSelection::All,
            include_antenna_port: true,
            include_peak_rssi: true,
            placement: None,
            location: None,
        }
    }

    /// Location-mode settings for an array mounted at `placement`.
    pub fn location(
        reader_mode: ReaderMode,
        session: Session,
        placement: Placement,
        reporting: LocationReporting,
    ) -> Self {
        Self {
            spatial_mode: SpatialMode::Location,
            reader_mode,
            search_mode: None,
            session,
            tag_population_estimate: None,
            antennas: AntennaSelection::Default,
            include_antenna_port: false,
            include_peak_rssi: false,
            placement: Some(placement),
            location: Some(reporting),
        }
    }
}

/// A tag singulated during inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSighting {
    pub tag: TagId,
    pub antenna_port: u16,
    pub peak_rssi_dbm: f64,
}

/// A position computed by the array for one tag over its compute window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationReport {
    pub tag: TagId,
    pub x_cm: i32,
    pub y_cm: i32,
    /// Reads that contributed to this position
    pub read_count: u32,
}

/// Raw diagnostic metrics; `metrics[0]` is the code, `metrics[1]` its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub metrics: Vec<u32>,
}

impl DiagnosticReport {
    /// Builds an end-of-cycle diagnostic carrying the cycle duration.
    pub fn end_of_cycle(cycle_micros: u32) -> Self {
        Self {
            metrics: vec![END_OF_CYCLE_METRIC, cycle_micros],
        }
    }

    pub fn code(&self) -> Option<u32> {
        self.metrics.first().copied()
    }

    pub fn value(&self) -> Option<u32> {
        self.metrics.get(1).copied()
    }
}

/// Everything a reader can push to its listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReaderReport {
    Inventory(TagSighting),
    Location(LocationReport),
    Diagnostic(DiagnosticReport),
}
