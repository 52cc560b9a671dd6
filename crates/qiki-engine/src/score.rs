//! Scorer capability
//!
//! The scoring model is opaque to the pipeline. Any runtime that can turn a
//! feature window and an action mask into per-action scores, a priority and
//! a parameter vector can back the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeatureWindow;

/// Raw scorer output for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutput {
    /// One raw score per action class. Masked classes should be `-inf`.
    pub scores: Vec<f64>,
    /// Scalar priority estimate in [0, 1]
    pub priority: f64,
    /// Continuous parameter vector
    pub params: Vec<f64>,
}

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Scorer unavailable: {0}")]
    Unavailable(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Black-box scoring model
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str {
        "scorer"
    }

    fn score(&self, features: &FeatureWindow, mask: &[bool]) -> Result<ScoreOutput, ScoreError>;
}

/// Replays a fixed output every cycle, applying the mask
///
/// Used for dry runs of the decision service and as a test double.
#[derive(Debug, Clone)]
pub struct StaticScorer {
    output: ScoreOutput,
}

impl StaticScorer {
    pub fn new(scores: Vec<f64>, priority: f64, params: Vec<f64>) -> Self {
        Self {
            output: ScoreOutput {
                scores,
                priority,
                params,
            },
        }
    }
}

impl Scorer for StaticScorer {
    fn name(&self) -> &str {
        "static"
    }

    fn score(&self, _features: &FeatureWindow, mask: &[bool]) -> Result<ScoreOutput, ScoreError> {
        let mut output = self.output.clone();
        for (score, &valid) in output.scores.iter_mut().zip(mask) {
            if !valid {
                *score = f64::NEG_INFINITY;
            }
        }
        Ok(output)
    }
}
