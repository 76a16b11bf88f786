//! Simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Multi-array fusion accuracy against ground truth
    Fusion,

    /// SIM-002: Discovery/location duty cycle timing
    DutyCycle,

    /// SIM-003: Duty cycle with injected reader failures
    FlakyReader,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::Fusion, ScenarioId::DutyCycle, ScenarioId::FlakyReader]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Fusion => "fusion",
            ScenarioId::DutyCycle => "duty_cycle",
            ScenarioId::FlakyReader => "flaky_reader",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Fusion => "Every configured array reports noisy positions; fused RMS error vs truth",
            ScenarioId::DutyCycle => "Discovery and location windows alternate with decay waits on persistent sessions",
            ScenarioId::FlakyReader => "Settings and start calls fail; the schedule still completes and disconnects",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fusion" | "sim-001" => Ok(ScenarioId::Fusion),
            "duty_cycle" | "dutycycle" | "sim-002" => Ok(ScenarioId::DutyCycle),
            "flaky_reader" | "flakyreader" | "sim-003" => Ok(ScenarioId::FlakyReader),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
