//! Decision trace artifacts

use chrono::{DateTime, Utc};
use qiki_types::{FsmState, Proposal};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// How a decision cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Pipeline ran to completion within budget
    Completed,
    /// The shield's global lockout rejected everything
    LockedOut,
    /// A stage faulted and the cycle degraded to no proposals
    Fault,
    /// The result arrived after the time budget and was discarded
    DeadlineExceeded,
}

impl CycleOutcome {
    /// Whether the cycle fell back to an empty result because of a fault or lateness
    pub fn is_degraded(&self) -> bool {
        matches!(self, CycleOutcome::Fault | CycleOutcome::DeadlineExceeded)
    }
}

/// Per-proposal summary carried in a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceProposal {
    pub id: String,
    pub confidence: f64,
    pub priority: f64,
    pub action: Option<String>,
}

impl From<&Proposal> for TraceProposal {
    fn from(p: &Proposal) -> Self {
        Self {
            id: p.proposal_id.clone(),
            confidence: p.confidence,
            priority: p.priority,
            action: p.primary_action().map(str::to_string),
        }
    }
}

/// One cycle's record, as published to the telemetry sink
///
/// `proposals` lists the synthesized candidates, before the safety shield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub cycle_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub fsm_state: FsmState,
    pub health_ok: bool,
    pub outcome: CycleOutcome,
    pub elapsed_ms: f64,
    pub proposals: Vec<TraceProposal>,
}

impl DecisionTrace {
    pub fn new(fsm_state: FsmState, health_ok: bool, outcome: CycleOutcome, elapsed: Duration) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            fsm_state,
            health_ok,
            outcome,
            elapsed_ms: elapsed.as_micros() as f64 / 1000.0,
            proposals: Vec::new(),
        }
    }

    pub fn with_proposals<'a>(mut self, proposals: impl IntoIterator<Item = &'a Proposal>) -> Self {
        self.proposals = proposals.into_iter().map(TraceProposal::from).collect();
        self
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qiki_types::ActuatorCommand;

    #[test]
    fn test_trace_json_shape() {
        let proposals = vec![
            Proposal::new("ne_0", "NeuralEngineV1", 0.7, 0.4)
                .with_action(ActuatorCommand::new("HOLD_POSITION")),
            Proposal::new("ne_5", "NeuralEngineV1", 0.6, 0.4),
        ];
        let trace = DecisionTrace::new(
            FsmState::Active,
            true,
            CycleOutcome::Completed,
            Duration::from_micros(1500),
        )
        .with_proposals(&proposals);

        let json: serde_json::Value = serde_json::from_slice(&trace.to_json().unwrap()).unwrap();

        assert_eq!(json["fsm_state"], "ACTIVE");
        assert_eq!(json["health_ok"], true);
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["elapsed_ms"], 1.5);
        assert_eq!(json["proposals"][0]["id"], "ne_0");
        assert_eq!(json["proposals"][0]["action"], "HOLD_POSITION");
        assert!(json["proposals"][1]["action"].is_null());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_degraded_outcomes() {
        assert!(CycleOutcome::Fault.is_degraded());
        assert!(CycleOutcome::DeadlineExceeded.is_degraded());
        assert!(!CycleOutcome::LockedOut.is_degraded());
        assert!(!CycleOutcome::Completed.is_degraded());
    }
}
