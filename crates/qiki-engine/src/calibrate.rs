//! Confidence calibration

use qiki_types::{QikiError, Result};

/// Temperature-scaled softmax
///
/// Lower temperatures sharpen the distribution; 1.0 leaves the scores'
/// natural distribution. Slots at `-inf` get probability zero.
#[derive(Debug, Clone, Copy)]
pub struct Calibrator {
    temperature: f64,
}

impl Calibrator {
    pub fn new(temperature: f64) -> Result<Self> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(QikiError::invalid_config(
                "calibration_temperature",
                format!("must be positive, got {temperature}"),
            ));
        }
        Ok(Self { temperature })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Probability distribution over `scores`
    ///
    /// Expects finite scores or `-inf`. If every slot is `-inf` the result
    /// is all zeros.
    pub fn calibrate(&self, scores: &[f64]) -> Vec<f64> {
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return vec![0.0; scores.len()];
        }

        let exps: Vec<f64> = scores
            .iter()
            .map(|&s| ((s - max) / self.temperature).exp())
            .collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }
}
