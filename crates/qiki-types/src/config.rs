//! Pipeline configuration
//!
//! Immutable after construction. Defaults match the reference deployment of
//! the NE_v1 scorer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{QikiError, Result};

/// Decision pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of ticks in the feature window
    #[serde(default = "default_window")]
    pub window: usize,

    /// Width of one feature vector
    #[serde(default = "default_feature_dim", alias = "in_dim")]
    pub feature_dim: usize,

    /// Number of action classes the scorer emits
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Length of the scorer's continuous parameter vector
    #[serde(default = "default_param_dim")]
    pub param_dim: usize,

    /// Maximum number of candidates synthesized per cycle
    #[serde(default = "default_topk")]
    pub topk: usize,

    /// Candidates below this calibrated probability are discarded
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Softmax temperature, must be positive
    #[serde(default = "default_temperature")]
    pub calibration_temperature: f64,

    /// Wall-clock budget for one cycle in milliseconds
    #[serde(default = "default_time_budget")]
    pub time_budget_ms: u64,

    /// Proposals with more commands than this are rejected
    #[serde(default = "default_max_actions")]
    pub max_actions_per_tick: usize,

    /// Capacity of the flap detection window
    #[serde(default = "default_flap_window")]
    pub flap_window: usize,

    /// Rank and truncate approved proposals before returning them
    #[serde(default = "default_true")]
    pub evaluate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            feature_dim: default_feature_dim(),
            num_classes: default_num_classes(),
            param_dim: default_param_dim(),
            topk: default_topk(),
            min_confidence: default_min_confidence(),
            calibration_temperature: default_temperature(),
            time_budget_ms: default_time_budget(),
            max_actions_per_tick: default_max_actions(),
            flap_window: default_flap_window(),
            evaluate: true,
        }
    }
}

impl PipelineConfig {
    /// Get the cycle budget as a duration
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(QikiError::invalid_config("window", "must be at least 1"));
        }
        if self.feature_dim == 0 {
            return Err(QikiError::invalid_config("feature_dim", "must be at least 1"));
        }
        if self.num_classes == 0 {
            return Err(QikiError::invalid_config("num_classes", "must be at least 1"));
        }
        if self.topk == 0 {
            return Err(QikiError::invalid_config("topk", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(QikiError::invalid_config(
                "min_confidence",
                format!("must be within [0, 1], got {}", self.min_confidence),
            ));
        }
        if !self.calibration_temperature.is_finite() || self.calibration_temperature <= 0.0 {
            return Err(QikiError::invalid_config(
                "calibration_temperature",
                format!("must be positive, got {}", self.calibration_temperature),
            ));
        }
        if self.time_budget_ms == 0 {
            return Err(QikiError::invalid_config("time_budget_ms", "must be at least 1"));
        }
        if self.max_actions_per_tick == 0 {
            return Err(QikiError::invalid_config("max_actions_per_tick", "must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_window() -> usize {
    16
}

fn default_feature_dim() -> usize {
    32
}

fn default_num_classes() -> usize {
    6
}

fn default_param_dim() -> usize {
    4
}

fn default_topk() -> usize {
    3
}

fn default_min_confidence() -> f64 {
    0.55
}

fn default_temperature() -> f64 {
    1.2
}

fn default_time_budget() -> u64 {
    8
}

fn default_max_actions() -> usize {
    3
}

fn default_flap_window() -> usize {
    5
}

fn default_true() -> bool {
    true
}
