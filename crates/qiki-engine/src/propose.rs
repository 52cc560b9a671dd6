//! Proposal synthesis from calibrated probabilities

use qiki_types::{ActionCatalog, ActionSpec, ActuatorCommand, PipelineConfig, Proposal, ENGINE_MODULE_ID};

/// A selected action class and its probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub confidence: f64,
}

/// Turns the top-k probabilities into single-command proposals
#[derive(Debug, Clone)]
pub struct ProposalSynthesizer {
    topk: usize,
    min_confidence: f64,
}

impl ProposalSynthesizer {
    pub fn new(topk: usize, min_confidence: f64) -> Self {
        Self { topk, min_confidence }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.topk, config.min_confidence)
    }

    /// Up to `topk` most probable classes at or above `min_confidence`
    ///
    /// Equal probabilities keep index order.
    pub fn select(&self, probs: &[f64]) -> Vec<Candidate> {
        let mut order: Vec<usize> = (0..probs.len()).collect();
        order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

        order
            .into_iter()
            .take(self.topk)
            .map(|index| Candidate {
                index,
                confidence: probs[index],
            })
            .filter(|c| c.confidence >= self.min_confidence)
            .collect()
    }

    /// One proposal per selected candidate, sharing the cycle's priority
    ///
    /// Catalog actions that declare parameters receive scorer parameters
    /// positionally, in parameter-name order.
    pub fn synthesize(
        &self,
        probs: &[f64],
        priority: f64,
        params: &[f64],
        catalog: &ActionCatalog,
    ) -> Vec<Proposal> {
        self.select(probs)
            .into_iter()
            .filter_map(|candidate| {
                let Some(spec) = catalog.by_index(candidate.index) else {
                    tracing::debug!(index = candidate.index, "candidate outside catalog skipped");
                    return None;
                };
                Some(
                    Proposal::new(
                        format!("ne_{}", candidate.index),
                        ENGINE_MODULE_ID,
                        candidate.confidence,
                        priority,
                    )
                    .with_justification(format!("Predicted by NE_v1 for {}", spec.name))
                    .with_action(command_for(spec, params)),
                )
            })
            .collect()
    }
}

fn command_for(spec: &ActionSpec, params: &[f64]) -> ActuatorCommand {
    spec.params
        .keys()
        .zip(params)
        .fold(ActuatorCommand::new(spec.name.clone()), |cmd, (name, &value)| {
            cmd.with_param(name.clone(), value)
        })
}
