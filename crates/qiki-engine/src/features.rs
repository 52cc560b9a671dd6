//! Feature extraction from agent context
//!
//! One tick's feature vector is composed in a fixed order and replicated
//! across the configured window:
//!
//! ```text
//! [ fsm one-hot (4) | health (3) | sensors (4) | action history (5) | zero padding ]
//! ```
//!
//! Missing or non-finite readings become 0.0. Extraction never fails.

use std::f64::consts::PI;

use qiki_types::{ActionCatalog, AgentContext, FsmState, PipelineConfig};

pub const STATE_SLOTS: usize = 4;
pub const HEALTH_SLOTS: usize = 3;
pub const SENSOR_SLOTS: usize = 4;
pub const HISTORY_SLOTS: usize = 5;

/// Number of composed slots before padding
pub const BASE_FEATURES: usize = STATE_SLOTS + HEALTH_SLOTS + SENSOR_SLOTS + HISTORY_SLOTS;

/// Feature sequence of shape `(window, dim)`, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    window: usize,
    dim: usize,
    values: Vec<f32>,
}

impl FeatureWindow {
    /// Replicate one tick across `window` rows
    pub fn replicate(tick: &[f32], window: usize) -> Self {
        let mut values = Vec::with_capacity(tick.len() * window);
        for _ in 0..window {
            values.extend_from_slice(tick);
        }
        Self {
            window,
            dim: tick.len(),
            values,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.window, self.dim)
    }

    pub fn row(&self, t: usize) -> Option<&[f32]> {
        if t >= self.window {
            return None;
        }
        Some(&self.values[t * self.dim..(t + 1) * self.dim])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.dim.max(1))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

/// Builds the scorer input and the action-validity mask
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    window: usize,
    feature_dim: usize,
    num_classes: usize,
}

impl FeatureExtractor {
    pub fn new(window: usize, feature_dim: usize, num_classes: usize) -> Self {
        Self {
            window,
            feature_dim,
            num_classes,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.window, config.feature_dim, config.num_classes)
    }

    /// Feature sequence and action mask for one cycle
    pub fn extract(&self, context: &AgentContext, catalog: &ActionCatalog) -> (FeatureWindow, Vec<bool>) {
        let tick = self.feature_vector(context);
        (FeatureWindow::replicate(&tick, self.window), self.action_mask(catalog))
    }

    /// One tick's feature vector, padded or truncated to `feature_dim`
    pub fn feature_vector(&self, context: &AgentContext) -> Vec<f32> {
        let mut features = Vec::with_capacity(BASE_FEATURES.max(self.feature_dim));

        let mut state = [0.0f32; STATE_SLOTS];
        state[state_slot(context.fsm_state)] = 1.0;
        features.extend_from_slice(&state);

        let health = &context.health;
        features.push(scaled(Some(health.temperature), 100.0, 0.0, 1.0));
        features.push(scaled(Some(health.power_draw), 100.0, 0.0, 1.0));
        features.push(scaled(Some(health.utilization), 100.0, 0.0, 1.0));

        let sensors = &context.sensors;
        features.push(scaled(sensors.distance, 10.0, 0.0, 1.0));
        features.push(scaled(sensors.velocity, 5.0, -1.0, 1.0));
        features.push(scaled(sensors.azimuth, PI, -1.0, 1.0));
        features.push(scaled(sensors.hazard_score, 1.0, 0.0, 1.0));

        let history = &sensors.action_history;
        let recent = &history[history.len().saturating_sub(HISTORY_SLOTS)..];
        let mut slots = [0.0f32; HISTORY_SLOTS];
        for (slot, &action) in slots.iter_mut().zip(recent) {
            *slot = scaled(Some(action), 10.0, 0.0, 1.0);
        }
        features.extend_from_slice(&slots);

        features.resize(self.feature_dim, 0.0);
        features
    }

    /// Slot `i` is valid iff class `i` names a catalog action
    pub fn action_mask(&self, catalog: &ActionCatalog) -> Vec<bool> {
        (0..self.num_classes).map(|i| i < catalog.len()).collect()
    }
}

fn state_slot(state: FsmState) -> usize {
    match state {
        FsmState::Booting => 0,
        FsmState::Idle => 1,
        FsmState::Active => 2,
        _ => 3,
    }
}

fn scaled(value: Option<f64>, scale: f64, lo: f64, hi: f64) -> f32 {
    let value = value.filter(|v| v.is_finite()).unwrap_or(0.0);
    (value / scale).clamp(lo, hi) as f32
}
