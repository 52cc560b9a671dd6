//! QIKI Guard - Safety Shield
//!
//! This crate is the single enforcement point for the safety invariants of
//! the decision layer. Every proposal produced from a model score passes
//! through [`SafetyShield::validate`] before it can reach an actuator.
//!
//! # Key Principle
//!
//! **Models may PROPOSE actions, NEVER ACTUATE them.**
//!
//! Model output is treated as untrusted and checked against:
//! - Global lockout (ERROR_STATE or unhealthy status rejects everything)
//! - Action count per proposal
//! - Catalog membership and declared parameter bounds
//! - Flap suppression (no third consecutive repeat of an action)
//!
//! Rejections are silent filtering. The shield never returns an error to
//! the pipeline; diagnostics are available through [`ShieldReport`].

pub mod window;

use std::sync::Arc;

use parking_lot::Mutex;
use qiki_types::{ActionCatalog, ActuatorCommand, FsmState, PipelineConfig, Proposal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use window::FlapWindow;

/// Why a single proposal was filtered out
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("Proposal carries {count} actions, limit is {max}")]
    TooManyActions { count: usize, max: usize },

    #[error("Action {action} is not in the catalog")]
    UnknownAction { action: String },

    /// Parameters the catalog does not declare are rejected outright rather
    /// than passed through unchecked.
    #[error("Action {action} does not declare parameter {param}")]
    UndeclaredParam { action: String, param: String },

    #[error("Action {action} parameter {param} = {value} outside [{min}, {max}]")]
    OutOfBounds {
        action: String,
        param: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Action {action} would repeat a third time within the flap window")]
    Flapping { action: String },
}

pub type Result<T> = std::result::Result<T, Rejection>;

/// Limits enforced by the shield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Proposals with more commands than this are discarded whole
    pub max_actions_per_tick: usize,
    /// Capacity of the approved-action history
    pub flap_window: usize,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            max_actions_per_tick: 3,
            flap_window: 5,
        }
    }
}

impl From<&PipelineConfig> for ShieldConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_actions_per_tick: config.max_actions_per_tick,
            flap_window: config.flap_window,
        }
    }
}

/// A proposal the shield dropped, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedProposal {
    pub proposal_id: String,
    pub reason: Rejection,
}

/// Outcome of one validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShieldReport {
    /// Whether the global lockout rejected the whole batch
    pub locked_out: bool,
    /// Number of proposals submitted
    pub considered: usize,
    /// Number of proposals approved
    pub approved: usize,
    /// Per-proposal rejections (empty under lockout)
    pub rejections: Vec<RejectedProposal>,
}

impl ShieldReport {
    /// Proposals that did not make it through, lockout included
    pub fn blocked(&self) -> usize {
        self.considered - self.approved
    }
}

/// The QIKI safety shield
///
/// The approved-action history is the only state that persists across
/// cycles. It is guarded by a mutex, so concurrent cycles serialize on it
/// and flap detection sees a consistent order of approvals.
pub struct SafetyShield {
    catalog: Arc<ActionCatalog>,
    config: ShieldConfig,
    history: Mutex<FlapWindow>,
}

impl SafetyShield {
    /// Create a shield with default limits
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self::with_config(catalog, ShieldConfig::default())
    }

    /// Create a shield with custom limits
    pub fn with_config(catalog: Arc<ActionCatalog>, config: ShieldConfig) -> Self {
        Self {
            catalog,
            config,
            history: Mutex::new(FlapWindow::new(config.flap_window)),
        }
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// Snapshot of the approved-action history, oldest first
    pub fn history(&self) -> Vec<Option<String>> {
        self.history
            .lock()
            .iter()
            .map(|entry| entry.map(str::to_string))
            .collect()
    }

    /// Filter proposals down to those satisfying every safety predicate
    ///
    /// Input order is preserved. Each approval is recorded in the history
    /// before the next proposal is checked.
    pub fn validate(&self, proposals: Vec<Proposal>, fsm_state: FsmState, health_ok: bool) -> Vec<Proposal> {
        self.validate_with_report(proposals, fsm_state, health_ok).0
    }

    /// [`validate`](Self::validate) plus a report of what was dropped and why
    pub fn validate_with_report(
        &self,
        proposals: Vec<Proposal>,
        fsm_state: FsmState,
        health_ok: bool,
    ) -> (Vec<Proposal>, ShieldReport) {
        let mut report = ShieldReport {
            considered: proposals.len(),
            ..ShieldReport::default()
        };

        if fsm_state.is_error() || !health_ok {
            report.locked_out = true;
            tracing::debug!(
                fsm_state = %fsm_state,
                health_ok,
                dropped = proposals.len(),
                "safety lockout"
            );
            return (Vec::new(), report);
        }

        let mut history = self.history.lock();
        let mut approved = Vec::with_capacity(proposals.len());

        for proposal in proposals {
            let verdict = self.check(&proposal).and_then(|()| {
                let primary = proposal.primary_action();
                if history.is_flapping(primary) {
                    Err(Rejection::Flapping {
                        action: primary.unwrap_or_default().to_string(),
                    })
                } else {
                    Ok(())
                }
            });

            match verdict {
                Ok(()) => {
                    history.push(proposal.primary_action().map(str::to_string));
                    approved.push(proposal);
                }
                Err(reason) => {
                    tracing::debug!(
                        proposal_id = %proposal.proposal_id,
                        reason = %reason,
                        "proposal rejected by safety shield"
                    );
                    report.rejections.push(RejectedProposal {
                        proposal_id: proposal.proposal_id,
                        reason,
                    });
                }
            }
        }

        report.approved = approved.len();
        (approved, report)
    }

    /// Stateless checks: action count, catalog membership, parameter bounds
    ///
    /// Any failing command invalidates the whole proposal.
    pub fn check(&self, proposal: &Proposal) -> Result<()> {
        let count = proposal.proposed_actions.len();
        if count > self.config.max_actions_per_tick {
            return Err(Rejection::TooManyActions {
                count,
                max: self.config.max_actions_per_tick,
            });
        }
        for command in &proposal.proposed_actions {
            self.check_command(command)?;
        }
        Ok(())
    }

    fn check_command(&self, command: &ActuatorCommand) -> Result<()> {
        let spec = self
            .catalog
            .get(&command.name)
            .ok_or_else(|| Rejection::UnknownAction {
                action: command.name.clone(),
            })?;

        for (param, &value) in &command.params {
            let bounds = spec.bounds(param).ok_or_else(|| Rejection::UndeclaredParam {
                action: command.name.clone(),
                param: param.clone(),
            })?;
            if !bounds.contains(value) {
                return Err(Rejection::OutOfBounds {
                    action: command.name.clone(),
                    param: param.clone(),
                    value,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }
        Ok(())
    }
}
