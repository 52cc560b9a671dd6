//! Agent context types
//!
//! The context is owned by the caller and read-only to the pipeline for the
//! duration of one decision cycle. Every field has a default so that partial
//! telemetry still deserializes into a well-defined context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete operational mode of the agent
///
/// Unknown state names parse as [`FsmState::Unspecified`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FsmState {
    #[default]
    Unspecified,
    Booting,
    Idle,
    Active,
    ErrorState,
    Shutdown,
}

impl FsmState {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            FsmState::Unspecified => "UNSPECIFIED",
            FsmState::Booting => "BOOTING",
            FsmState::Idle => "IDLE",
            FsmState::Active => "ACTIVE",
            FsmState::ErrorState => "ERROR_STATE",
            FsmState::Shutdown => "SHUTDOWN",
        }
    }

    /// Whether this state locks out every action
    pub fn is_error(&self) -> bool {
        matches!(self, FsmState::ErrorState)
    }
}

impl FromStr for FsmState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        let name = name.strip_prefix("FSM_STATE_").unwrap_or(&name);
        Ok(match name {
            "BOOTING" => FsmState::Booting,
            "IDLE" => FsmState::Idle,
            "ACTIVE" => FsmState::Active,
            "ERROR_STATE" => FsmState::ErrorState,
            "SHUTDOWN" => FsmState::Shutdown,
            _ => FsmState::Unspecified,
        })
    }
}

impl From<String> for FsmState {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<&str> for FsmState {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<FsmState> for String {
    fn from(state: FsmState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness flag plus continuous diagnostic readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall readiness. `false` locks out every action.
    #[serde(default)]
    pub ok: bool,
    /// Temperature reading (nominal range 0..100)
    #[serde(default)]
    pub temperature: f64,
    /// Power draw reading (nominal range 0..100)
    #[serde(default)]
    pub power_draw: f64,
    /// Utilization reading (nominal range 0..100)
    #[serde(default)]
    pub utilization: f64,
}

impl HealthStatus {
    /// Healthy status with zeroed readings
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            ok: false,
            temperature: 0.0,
            power_draw: 0.0,
            utilization: 0.0,
        }
    }
}

/// Sensor readings. Missing readings are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazard_score: Option<f64>,
    /// Recent action codes, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_history: Vec<f64>,
}

/// Everything the pipeline may read about the agent in one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    #[serde(default)]
    pub fsm_state: FsmState,
    #[serde(default, alias = "bios_status")]
    pub health: HealthStatus,
    #[serde(default, alias = "sensor_data")]
    pub sensors: SensorData,
}

impl AgentContext {
    /// Create a context with the given state and health flag and no sensor data
    pub fn new(fsm_state: FsmState, health_ok: bool) -> Self {
        Self {
            fsm_state,
            health: HealthStatus {
                ok: health_ok,
                ..HealthStatus::default()
            },
            sensors: SensorData::default(),
        }
    }

    /// Attach sensor readings
    pub fn with_sensors(mut self, sensors: SensorData) -> Self {
        self.sensors = sensors;
        self
    }

    /// Attach health readings, keeping the readiness flag
    pub fn with_readings(mut self, temperature: f64, power_draw: f64, utilization: f64) -> Self {
        self.health.temperature = temperature;
        self.health.power_draw = power_draw;
        self.health.utilization = utilization;
        self
    }

    pub fn health_ok(&self) -> bool {
        self.health.ok
    }
}
