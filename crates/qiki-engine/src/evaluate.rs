//! Final ranking of approved proposals

use std::cmp::Ordering;

use qiki_types::Proposal;

/// Keeps confident proposals, ranks by priority then confidence, truncates
#[derive(Debug, Clone, Copy)]
pub struct ProposalEvaluator {
    min_confidence: f64,
    limit: usize,
}

impl ProposalEvaluator {
    pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
    pub const DEFAULT_LIMIT: usize = 3;

    pub fn new() -> Self {
        Self::with_limits(Self::DEFAULT_MIN_CONFIDENCE, Self::DEFAULT_LIMIT)
    }

    pub fn with_limits(min_confidence: f64, limit: usize) -> Self {
        Self { min_confidence, limit }
    }

    pub fn evaluate(&self, mut proposals: Vec<Proposal>) -> Vec<Proposal> {
        proposals.retain(|p| p.confidence >= self.min_confidence);
        proposals.sort_by(|a, b| rank(b, a));
        proposals.truncate(self.limit);
        proposals
    }
}

impl Default for ProposalEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn rank(a: &Proposal, b: &Proposal) -> Ordering {
    a.priority
        .total_cmp(&b.priority)
        .then_with(|| a.confidence.total_cmp(&b.confidence))
}
