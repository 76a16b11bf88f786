//! Ground truth oracle for simulation.
//!
//! The Oracle holds the true floor position of every simulated tag and
//! generates what the arrays would report about them:
//! - location reports with Gaussian position noise and random read counts
//! - inventory sightings for discovery windows
//! - end-of-cycle diagnostics with jittered cycle times

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tagfusion_env::{DiagnosticReport, LocationReport, TagId, TagSighting};

/// Base of the simulated EPC range.
const EPC_BASE: u128 = 0xE280_1160_6000_0000_0000_0000;

/// Highest antenna beam port on a location array.
const MAX_ANTENNA_PORT: u16 = 52;

/// A tag's true position on the floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthTag {
    pub tag: TagId,
    pub x_cm: f64,
    pub y_cm: f64,
}

/// The ground truth oracle.
pub struct Oracle {
    tags: Vec<GroundTruthTag>,

    /// Seeded RNG so every report stream is reproducible
    rng: ChaCha8Rng,

    /// Position noise (cm); `None` means exact positions
    position_noise: Option<Normal<f64>>,
}

impl Oracle {
    pub fn new(seed: u64) -> Self {
        Self {
            tags: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            position_noise: None,
        }
    }

    /// Sets the standard deviation of reported positions. Non-positive or
    /// non-finite values disable noise.
    pub fn set_position_noise(&mut self, std_dev_cm: f64) {
        self.position_noise = if std_dev_cm > 0.0 {
            Normal::new(0.0, std_dev_cm).ok()
        } else {
            None
        };
    }

    /// Places a tag at a fixed position and returns its EPC.
    pub fn spawn_tag(&mut self, x_cm: f64, y_cm: f64) -> TagId {
        let serial = self.tags.len() as u128;
        let tag = TagId::new(format!("{:024X}", EPC_BASE + serial));
        self.tags.push(GroundTruthTag {
            tag: tag.clone(),
            x_cm,
            y_cm,
        });
        tag
    }

    /// Scatters `count` tags uniformly over a `width_cm` x `depth_cm` floor.
    pub fn spawn_random_tags(&mut self, count: usize, width_cm: f64, depth_cm: f64) -> Vec<TagId> {
        (0..count)
            .map(|_| {
                let x = self.rng.gen_range(0.0..=width_cm);
                let y = self.rng.gen_range(0.0..=depth_cm);
                self.spawn_tag(x, y)
            })
            .collect()
    }

    pub fn tags(&self) -> &[GroundTruthTag] {
        &self.tags
    }

    pub fn ground_truth(&self, tag: &TagId) -> Option<(f64, f64)> {
        self.tags
            .iter()
            .find(|t| &t.tag == tag)
            .map(|t| (t.x_cm, t.y_cm))
    }

    /// One location report per tag, as a single array would send them.
    ///
    /// Read counts are drawn from `1..=max_reads`.
    pub fn location_reports(&mut self, max_reads: u32) -> Vec<LocationReport> {
        let max_reads = max_reads.max(1);
        let mut reports = Vec::with_capacity(self.tags.len());
        for index in 0..self.tags.len() {
            let (x, y) = (self.tags[index].x_cm, self.tags[index].y_cm);
            let x_cm = self.noisy(x);
            let y_cm = self.noisy(y);
            let read_count = self.rng.gen_range(1..=max_reads);
            reports.push(LocationReport {
                tag: self.tags[index].tag.clone(),
                x_cm,
                y_cm,
                read_count,
            });
        }
        reports
    }

    /// Sightings for a discovery window; each tag is seen with probability
    /// `visibility`.
    pub fn inventory_sightings(&mut self, visibility: f64) -> Vec<TagSighting> {
        let visibility = visibility.clamp(0.0, 1.0);
        let mut sightings = Vec::new();
        for index in 0..self.tags.len() {
            if !self.rng.gen_bool(visibility) {
                continue;
            }
            sightings.push(TagSighting {
                tag: self.tags[index].tag.clone(),
                antenna_port: self.rng.gen_range(1..=MAX_ANTENNA_PORT),
                peak_rssi_dbm: self.rng.gen_range(-75.0..=-35.0),
            });
        }
        sightings
    }

    /// End-of-cycle diagnostic with the cycle time jittered by up to 10%.
    pub fn cycle_diagnostic(&mut self, mean_cycle_micros: u32) -> DiagnosticReport {
        let jitter = mean_cycle_micros / 10;
        let low = mean_cycle_micros.saturating_sub(jitter).max(1);
        let high = mean_cycle_micros.saturating_add(jitter).max(low);
        DiagnosticReport::end_of_cycle(self.rng.gen_range(low..=high))
    }

    fn noisy(&mut self, value: f64) -> i32 {
        let offset = match &self.position_noise {
            Some(normal) => normal.sample(&mut self.rng),
            None => 0.0,
        };
        (value + offset).round() as i32
    }
}
