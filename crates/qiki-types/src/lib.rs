//! QIKI Types - Canonical domain types for the neural decision layer
//!
//! This crate contains the foundational types shared by every stage of the
//! decision pipeline, with zero dependencies on other qiki crates:
//!
//! - Agent context (FSM state, health status, sensor readings)
//! - Action catalog with per-parameter bounds
//! - Actuator commands and proposals
//! - Pipeline configuration
//!
//! # Pipeline
//!
//! ```text
//! AgentContext → Features → Scores → Probabilities → Proposals → Shield → Ranking
//! ```
//!
//! A proposal is never executed by this layer. It is a candidate that only
//! reaches the caller after the safety shield has approved it.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod proposal;

pub use catalog::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use proposal::*;

/// Source module id stamped on proposals produced by the neural engine
pub const ENGINE_MODULE_ID: &str = "NeuralEngineV1";
