//! Fixed location arrays and the ordered set they form.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tagfusion_env::{Placement, SensorId, Session};

/// One ceiling-mounted location array. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Hostname / address of the array
    pub id: SensorId,

    /// Mounting height and facility offset
    pub placement: Placement,

    /// RF session this array inventories on
    pub session: Session,
}

impl Sensor {
    pub fn new(
        id: impl Into<String>,
        height_cm: i16,
        facility_x_cm: i32,
        facility_y_cm: i32,
        orientation_deg: i16,
        session: Session,
    ) -> Self {
        Self {
            id: SensorId::new(id),
            placement: Placement {
                height_cm,
                facility_x_cm,
                facility_y_cm,
                orientation_deg,
            },
            session,
        }
    }
}

/// Ordered, non-empty list of arrays whose reports are fused.
///
/// The last array is the trigger sensor: its report for a tag closes that
/// tag's fusion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Sensor>", into = "Vec<Sensor>")]
pub struct SensorArray {
    sensors: Vec<Sensor>,
}

impl SensorArray {
    pub fn new(sensors: Vec<Sensor>) -> Result<Self, ConfigError> {
        if sensors.is_empty() {
            return Err(ConfigError::EmptySensorArray);
        }
        let mut seen = HashSet::new();
        for sensor in &sensors {
            if !seen.insert(&sensor.id) {
                return Err(ConfigError::DuplicateSensor(sensor.id.to_string()));
            }
        }
        Ok(Self { sensors })
    }

    /// The designated trigger sensor (last in order).
    pub fn trigger(&self) -> &Sensor {
        // Non-empty by construction.
        &self.sensors[self.sensors.len() - 1]
    }

    pub fn is_trigger(&self, id: &SensorId) -> bool {
        &self.trigger().id == id
    }

    pub fn get(&self, id: &SensorId) -> Option<&Sensor> {
        self.sensors.iter().find(|s| &s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl TryFrom<Vec<Sensor>> for SensorArray {
    type Error = ConfigError;

    fn try_from(sensors: Vec<Sensor>) -> Result<Self, Self::Error> {
        Self::new(sensors)
    }
}

impl From<SensorArray> for Vec<Sensor> {
    fn from(array: SensorArray) -> Self {
        array.sensors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_arrays() -> SensorArray {
        SensorArray::new(vec![
            Sensor::new("xarray-a", 300, 0, 0, 0, Session(2)),
            Sensor::new("xarray-b", 300, 0, 400, 0, Session(3)),
        ])
        .unwrap()
    }

    #[test]
    fn test_last_sensor_is_trigger() {
        let array = two_arrays();
        assert_eq!(array.trigger().id, SensorId::new("xarray-b"));
        assert!(array.is_trigger(&SensorId::new("xarray-b")));
        assert!(!array.is_trigger(&SensorId::new("xarray-a")));
    }

    #[test]
    fn test_single_sensor_triggers_itself() {
        let array = SensorArray::new(vec![Sensor::new("solo", 300, 0, 0, 0, Session(2))]).unwrap();
        assert!(array.is_trigger(&SensorId::new("solo")));
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(matches!(SensorArray::new(vec![]), Err(ConfigError::EmptySensorArray)));

        let dup = SensorArray::new(vec![
            Sensor::new("xarray-a", 300, 0, 0, 0, Session(2)),
            Sensor::new("xarray-a", 300, 0, 400, 0, Session(3)),
        ]);
        assert!(matches!(dup, Err(ConfigError::DuplicateSensor(_))));
    }

    #[test]
    fn test_lookup_by_id() {
        let array = two_arrays();
        let sensor = array.get(&SensorId::new("xarray-a")).unwrap();
        assert_eq!(sensor.session, Session(2));
        assert!(array.get(&SensorId::new("missing")).is_none());
    }
}
