//! Configuration for the fusion engine, the duty-cycle scheduler and the
//! sensor array they run against.
//!
//! Every value that used to be a tuning constant is a field here. All structs
//! deserialize from JSON with per-field defaults, so a config file only needs
//! to name what it changes.

use crate::sensor::{Sensor, SensorArray};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tagfusion_env::{LocationReporting, Placement, ReaderMode, ReaderSettings, SearchMode, Session};
use thiserror::Error;

/// Errors raised while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Sensor array must contain at least one sensor")]
    EmptySensorArray,

    #[error("Duplicate sensor id: {0}")]
    DuplicateSensor(String),

    #[error("Compute window must be at least one second")]
    ZeroComputeWindow,

    #[error("Iteration count must be at least one")]
    ZeroIterations,

    #[error("Reader for {reader} does not match sensor {sensor} at position {index}")]
    ReaderMismatch {
        index: usize,
        sensor: String,
        reader: String,
    },

    #[error("Expected {expected} readers, got {actual}")]
    ReaderCount { expected: usize, actual: usize },
}

// ============================================================================
// FUSION
// ============================================================================

/// Configuration shared by every array feeding the fusion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Reader RF mode applied in location mode (default: AutoSetDenseReader)
    pub reader_mode: ReaderMode,

    /// Averaging window of each array's position computation (default: 30 s)
    pub compute_window_secs: u16,

    /// Tag age interval (default: 60 s, twice the compute window)
    pub tag_age_interval_secs: u16,

    /// Location report interval (default: 10 s)
    pub update_interval_secs: u16,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            reader_mode: ReaderMode::AutoSetDenseReader,
            compute_window_secs: 30,
            tag_age_interval_secs: 60,
            update_interval_secs: 10,
        }
    }
}

impl FusionConfig {
    pub fn compute_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.compute_window_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compute_window_secs == 0 {
            return Err(ConfigError::ZeroComputeWindow);
        }
        Ok(())
    }

    /// Location reporting for fusion: every report type plus end-of-cycle
    /// diagnostics, which confidence weighting depends on.
    pub fn location_reporting(&self) -> LocationReporting {
        LocationReporting {
            compute_window_secs: self.compute_window_secs,
            tag_age_interval_secs: self.tag_age_interval_secs,
            update_interval_secs: self.update_interval_secs,
            entry_reports: true,
            update_reports: true,
            exit_reports: true,
            diagnostic_reports: true,
        }
    }

    /// Full location-mode settings for one array of the fused set.
    pub fn settings_for(&self, sensor: &Sensor) -> ReaderSettings {
        ReaderSettings::location(
            self.reader_mode,
            sensor.session,
            sensor.placement,
            self.location_reporting(),
        )
    }
}

// ============================================================================
// DUTY-CYCLE SCHEDULER
// ============================================================================

/// Wide-area inventory role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryRole {
    /// Gen2 search mode (default: SingleTarget)
    pub search_mode: SearchMode,

    /// RF session (default: 3)
    pub session: Session,

    /// Tag population estimate handed to the reader (default: 2).
    ///
    /// Deliberately far below the real population: a single beam only sees a
    /// fraction of the tags at any instant, and persistent sessions suppress
    /// tags already read. Raise it (32 is a common WAM setting) for denser
    /// floors where 2 starves the Q algorithm.
    pub tag_population_estimate: u16,

    /// Time spent inventorying per iteration (default: 30 s)
    pub duration_secs: u64,
}

impl Default for DiscoveryRole {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::SingleTarget,
            session: Session(3),
            tag_population_estimate: 2,
            duration_secs: 30,
        }
    }
}

/// Precision location role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRole {
    /// RF session (default: 2)
    pub session: Session,

    /// Mounting of the array (default: 280 cm, facility origin, 0°)
    pub placement: Placement,

    /// Compute window (default: 10 s)
    pub compute_window_secs: u16,

    /// Tag age interval (default: 60 s)
    pub tag_age_interval_secs: u16,

    /// Update interval (default: 5 s)
    pub update_interval_secs: u16,

    /// Phase length; `None` means one compute window plus one second.
    pub duration_secs: Option<u64>,
}

impl Default for LocationRole {
    fn default() -> Self {
        Self {
            session: Session(2),
            placement: Placement {
                height_cm: 280, // low ceiling
                facility_x_cm: 0,
                facility_y_cm: 0,
                orientation_deg: 0,
            },
            compute_window_secs: 10,
            tag_age_interval_secs: 60,
            update_interval_secs: 5,
            duration_secs: None,
        }
    }
}

impl LocationRole {
    pub fn duration(&self) -> Duration {
        match self.duration_secs {
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(u64::from(self.compute_window_secs) + 1),
        }
    }
}

/// Configuration for the duty-cycle role scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Reader RF mode for both roles (default: AutoSetDenseReaderDeepScan)
    pub reader_mode: ReaderMode,

    pub discovery: DiscoveryRole,

    pub location: LocationRole,

    /// Discovery + Location rounds (default: 2)
    pub iterations: u32,

    /// Wait before re-entering discovery on a persistent session (default: 120 s)
    pub persistence_decay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reader_mode: ReaderMode::AutoSetDenseReaderDeepScan,
            discovery: DiscoveryRole::default(),
            location: LocationRole::default(),
            iterations: 2,
            persistence_decay_secs: 120,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.location.compute_window_secs == 0 {
            return Err(ConfigError::ZeroComputeWindow);
        }
        Ok(())
    }

    pub fn discovery_duration(&self) -> Duration {
        Duration::from_secs(self.discovery.duration_secs)
    }

    pub fn persistence_decay(&self) -> Duration {
        Duration::from_secs(self.persistence_decay_secs)
    }

    pub fn discovery_settings(&self) -> ReaderSettings {
        ReaderSettings::inventory(
            self.reader_mode,
            self.discovery.search_mode,
            self.discovery.session,
            self.discovery.tag_population_estimate,
        )
    }

    pub fn location_settings(&self) -> ReaderSettings {
        let location = &self.location;
        ReaderSettings::location(
            self.reader_mode,
            location.session,
            location.placement,
            LocationReporting {
                compute_window_secs: location.compute_window_secs,
                tag_age_interval_secs: location.tag_age_interval_secs,
                update_interval_secs: location.update_interval_secs,
                entry_reports: true,
                update_reports: true,
                exit_reports: true,
                diagnostic_reports: false,
            },
        )
    }
}

// ============================================================================
// FILE CONFIG
// ============================================================================

/// Everything a deployment describes in one JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagFusionConfig {
    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    pub sensors: SensorArray,
}

impl TagFusionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.fusion.validate()?;
        config.scheduler.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_duration_defaults_to_window_plus_one() {
        let role = LocationRole::default();
        assert_eq!(role.duration(), Duration::from_secs(11));

        let fixed = LocationRole {
            duration_secs: Some(4),
            ..LocationRole::default()
        };
        assert_eq!(fixed.duration(), Duration::from_secs(4));
    }

    #[test]
    fn test_discovery_settings_use_small_estimate() {
        let config = SchedulerConfig::default();
        let settings = config.discovery_settings();
        assert_eq!(settings.tag_population_estimate, Some(2));
        assert_eq!(settings.session, Session(3));
        assert_eq!(settings.search_mode, Some(SearchMode::SingleTarget));
    }

    #[test]
    fn test_location_settings_use_distinct_session() {
        let config = SchedulerConfig::default();
        let settings = config.location_settings();
        assert_ne!(settings.session, config.discovery.session);
        let reporting = settings.location.unwrap();
        assert_eq!(reporting.compute_window_secs, 10);
        assert_eq!(reporting.update_interval_secs, 5);
        assert_eq!(settings.placement.unwrap().height_cm, 280);
    }

    #[test]
    fn test_fusion_settings_enable_diagnostics() {
        let config = FusionConfig::default();
        let sensor = Sensor::new("xarray-a", 300, 0, 400, 0, Session(3));
        let settings = config.settings_for(&sensor);
        assert!(settings.location.unwrap().diagnostic_reports);
        assert_eq!(settings.session, Session(3));
        assert_eq!(settings.placement.unwrap().facility_y_cm, 400);
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let config = SchedulerConfig {
            iterations: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroIterations)));
    }

    #[test]
    fn test_parse_partial_json() {
        let json = r#"{
            "fusion": { "compute_window_secs": 20 },
            "scheduler": { "iterations": 3, "discovery": { "session": 1 } },
            "sensors": [
                { "id": "xarray-a", "placement": { "height_cm": 300, "facility_x_cm": 0, "facility_y_cm": 0, "orientation_deg": 0 }, "session": 2 },
                { "id": "xarray-b", "placement": { "height_cm": 300, "facility_x_cm": 0, "facility_y_cm": 400, "orientation_deg": 0 }, "session": 3 }
            ]
        }"#;

        let config = TagFusionConfig::from_json_str(json).unwrap();
        assert_eq!(config.fusion.compute_window_secs, 20);
        assert_eq!(config.fusion.update_interval_secs, 10);
        assert_eq!(config.scheduler.iterations, 3);
        assert_eq!(config.scheduler.discovery.session, Session(1));
        assert_eq!(config.scheduler.discovery.duration_secs, 30);
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors.trigger().id.as_str(), "xarray-b");
    }

    #[test]
    fn test_parse_rejects_empty_array() {
        let json = r#"{ "sensors": [] }"#;
        assert!(TagFusionConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_parse_rejects_zero_window() {
        let json = r#"{
            "fusion": { "compute_window_secs": 0 },
            "sensors": [
                { "id": "xarray-a", "placement": { "height_cm": 300, "facility_x_cm": 0, "facility_y_cm": 0, "orientation_deg": 0 }, "session": 2 }
            ]
        }"#;
        assert!(matches!(
            TagFusionConfig::from_json_str(json),
            Err(ConfigError::ZeroComputeWindow)
        ));
    }
}
