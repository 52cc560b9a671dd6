//! QIKI Neural Engine - proposal generation for the agent decision layer
//!
//! The engine turns an [`AgentContext`](qiki_types::AgentContext) into a
//! ranked list of approved proposals in one synchronous call:
//!
//! ```text
//! features → scorer → calibration → synthesis → safety shield → ranking
//! ```
//!
//! The engine is fail-closed. A scorer error or panic, a malformed score
//! vector, a shield lockout or a blown time budget all produce an empty
//! result rather than an error. What happened is reported to the
//! [`EngineObserver`] and, as a [`DecisionTrace`], to the telemetry sink.

pub mod calibrate;
pub mod engine;
pub mod evaluate;
pub mod features;
pub mod observe;
pub mod propose;
pub mod score;

pub use calibrate::Calibrator;
pub use engine::{EngineConfig, EngineError, NeuralEngine};
pub use evaluate::ProposalEvaluator;
pub use features::{FeatureExtractor, FeatureWindow};
pub use observe::{CycleReport, EngineObserver, MetricsObserver, NoopObserver};
pub use propose::{Candidate, ProposalSynthesizer};
pub use score::{ScoreError, ScoreOutput, Scorer, StaticScorer};

pub use qiki_telemetry::{CycleOutcome, DecisionTrace};
