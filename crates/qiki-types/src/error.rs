//! Error types for QIKI
//!
//! Configuration problems are surfaced at construction time. Nothing in a
//! decision cycle returns these to the caller.

use thiserror::Error;

/// Result type for QIKI type operations
pub type Result<T> = std::result::Result<T, QikiError>;

/// QIKI error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QikiError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================

    /// A pipeline configuration value is out of its allowed range
    #[error("Invalid pipeline config: {field} {reason}")]
    InvalidConfig { field: String, reason: String },

    // ========================================================================
    // Catalog Errors
    // ========================================================================

    /// An action has an empty name
    #[error("Action catalog entry {index} has an empty name")]
    EmptyActionName { index: usize },

    /// The same action name is declared twice
    #[error("Action {name} is declared more than once")]
    DuplicateAction { name: String },

    /// A parameter bound is not a finite, ordered interval
    #[error("Action {action} parameter {param} has invalid bounds [{min}, {max}]")]
    InvalidBounds {
        action: String,
        param: String,
        min: f64,
        max: f64,
    },
}

impl QikiError {
    /// Shorthand for an invalid config field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
