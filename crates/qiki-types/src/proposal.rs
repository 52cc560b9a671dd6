//! Actuator commands and proposals

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single actuator action with its numeric parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl ActuatorCommand {
    /// A command with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

/// A candidate actuator bundle with confidence and priority
///
/// Created fresh each cycle. Never mutated after the safety shield releases it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub source_module_id: String,
    /// Calibrated probability in [0, 1]
    pub confidence: f64,
    /// Scorer priority estimate in [0, 1]
    pub priority: f64,
    pub justification: String,
    pub proposed_actions: Vec<ActuatorCommand>,
}

impl Proposal {
    pub fn new(
        proposal_id: impl Into<String>,
        source_module_id: impl Into<String>,
        confidence: f64,
        priority: f64,
    ) -> Self {
        Self {
            proposal_id: proposal_id.into(),
            source_module_id: source_module_id.into(),
            confidence,
            priority,
            justification: String::new(),
            proposed_actions: Vec::new(),
        }
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    pub fn with_action(mut self, command: ActuatorCommand) -> Self {
        self.proposed_actions.push(command);
        self
    }

    /// Name of the first command, the one flap detection looks at
    pub fn primary_action(&self) -> Option<&str> {
        self.proposed_actions.first().map(|c| c.name.as_str())
    }
}
