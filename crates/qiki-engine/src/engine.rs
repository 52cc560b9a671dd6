//! NeuralEngine orchestrator

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use qiki_guard::{SafetyShield, ShieldConfig, ShieldReport};
use qiki_telemetry::{CycleOutcome, DecisionTrace, NullSink, TelemetrySink, TraceProposal};
use qiki_types::{ActionCatalog, AgentContext, PipelineConfig, Proposal, QikiError};

use crate::calibrate::Calibrator;
use crate::evaluate::ProposalEvaluator;
use crate::features::{FeatureExtractor, FeatureWindow};
use crate::observe::{CycleReport, EngineObserver, NoopObserver};
use crate::propose::ProposalSynthesizer;
use crate::score::{ScoreError, ScoreOutput, Scorer};

/// Everything needed to build a [`NeuralEngine`]
pub struct EngineConfig {
    pub pipeline: PipelineConfig,
    pub catalog: Arc<ActionCatalog>,
    pub scorer: Box<dyn Scorer>,
    pub observer: Arc<dyn EngineObserver>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl EngineConfig {
    /// Config with no observer and no telemetry
    pub fn new(pipeline: PipelineConfig, catalog: Arc<ActionCatalog>, scorer: Box<dyn Scorer>) -> Self {
        Self {
            pipeline,
            catalog,
            scorer,
            observer: Arc::new(NoopObserver),
            telemetry: Arc::new(NullSink),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

/// Faults that void a cycle. None of these reach the caller of
/// [`NeuralEngine::generate_proposals`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] QikiError),
    #[error("Scorer failed: {0}")]
    Scorer(#[from] ScoreError),
    #[error("Scorer panicked: {0}")]
    ScorerPanicked(String),
    #[error("Scorer returned {actual} scores, expected {expected}")]
    ScoreShape { expected: usize, actual: usize },
    #[error("Scorer returned {actual} parameters, expected {expected}")]
    ParamShape { expected: usize, actual: usize },
    #[error("Scorer returned a non-finite {what}")]
    NonFinite { what: &'static str },
    #[error("No action class is selectable")]
    NothingSelectable,
}

struct CycleResult {
    synthesized: Vec<TraceProposal>,
    approved: Vec<Proposal>,
    shield: ShieldReport,
}

/// Decision pipeline: features → scorer → calibration → synthesis →
/// safety shield → ranking, under a wall-clock budget
///
/// Every failure mode resolves to an empty result. The engine is `Sync`;
/// concurrent cycles serialize only on the shield's history.
pub struct NeuralEngine {
    config: PipelineConfig,
    catalog: Arc<ActionCatalog>,
    extractor: FeatureExtractor,
    scorer: Box<dyn Scorer>,
    calibrator: Calibrator,
    synthesizer: ProposalSynthesizer,
    shield: SafetyShield,
    evaluator: Option<ProposalEvaluator>,
    observer: Arc<dyn EngineObserver>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl NeuralEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let pipeline = config.pipeline;
        pipeline.validate()?;
        if config.catalog.is_empty() {
            return Err(QikiError::invalid_config("catalog", "must declare at least one action").into());
        }
        if config.catalog.len() > pipeline.num_classes {
            tracing::warn!(
                actions = config.catalog.len(),
                num_classes = pipeline.num_classes,
                "catalog has more actions than scorer classes; the extra actions can never be proposed"
            );
        }

        Ok(Self {
            extractor: FeatureExtractor::from_config(&pipeline),
            calibrator: Calibrator::new(pipeline.calibration_temperature)?,
            synthesizer: ProposalSynthesizer::from_config(&pipeline),
            shield: SafetyShield::with_config(Arc::clone(&config.catalog), ShieldConfig::from(&pipeline)),
            evaluator: pipeline.evaluate.then(ProposalEvaluator::new),
            catalog: config.catalog,
            scorer: config.scorer,
            observer: config.observer,
            telemetry: config.telemetry,
            config: pipeline,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn shield(&self) -> &SafetyShield {
        &self.shield
    }

    /// Run one decision cycle
    ///
    /// Returns the approved, ranked proposals, or an empty list when a stage
    /// faulted, the shield locked out, or the cycle overran its budget.
    pub fn generate_proposals(&self, context: &AgentContext) -> Vec<Proposal> {
        let start = Instant::now();
        let budget = self.config.time_budget();

        let (outcome, proposals, synthesized, shield) = match self.run_cycle(context) {
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    fsm_state = %context.fsm_state,
                    "decision cycle faulted, returning no proposals"
                );
                (CycleOutcome::Fault, Vec::new(), Vec::new(), ShieldReport::default())
            }
            Ok(cycle) => {
                let ranked = match &self.evaluator {
                    Some(evaluator) => evaluator.evaluate(cycle.approved),
                    None => cycle.approved,
                };
                let elapsed = start.elapsed();
                if elapsed > budget {
                    tracing::warn!(
                        elapsed_ms = millis(elapsed),
                        budget_ms = self.config.time_budget_ms,
                        discarded = ranked.len(),
                        "time budget exceeded, discarding proposals"
                    );
                    (CycleOutcome::DeadlineExceeded, Vec::new(), cycle.synthesized, cycle.shield)
                } else if cycle.shield.locked_out {
                    (CycleOutcome::LockedOut, ranked, cycle.synthesized, cycle.shield)
                } else {
                    (CycleOutcome::Completed, ranked, cycle.synthesized, cycle.shield)
                }
            }
        };

        let elapsed = start.elapsed();
        self.report(context, outcome, elapsed, synthesized, &shield, &proposals);
        proposals
    }

    fn run_cycle(&self, context: &AgentContext) -> Result<CycleResult, EngineError> {
        let (features, mask) = self.extractor.extract(context, &self.catalog);
        let output = self.invoke_scorer(&features, &mask)?;
        let scores = self.checked_scores(output.scores, &mask)?;
        let priority = checked_priority(output.priority)?;
        self.check_params(&output.params)?;

        let probs = self.calibrator.calibrate(&scores);
        let candidates = self
            .synthesizer
            .synthesize(&probs, priority, &output.params, &self.catalog);
        let synthesized = candidates.iter().map(TraceProposal::from).collect();

        let (approved, shield) =
            self.shield
                .validate_with_report(candidates, context.fsm_state, context.health_ok());

        Ok(CycleResult {
            synthesized,
            approved,
            shield,
        })
    }

    fn invoke_scorer(&self, features: &FeatureWindow, mask: &[bool]) -> Result<ScoreOutput, EngineError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.scorer.score(features, mask))) {
            Ok(result) => Ok(result?),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EngineError::ScorerPanicked(message))
            }
        }
    }

    /// Enforce shape, force masked slots to `-inf`, reject NaN and `+inf`
    fn checked_scores(&self, mut scores: Vec<f64>, mask: &[bool]) -> Result<Vec<f64>, EngineError> {
        if scores.len() != self.config.num_classes {
            return Err(EngineError::ScoreShape {
                expected: self.config.num_classes,
                actual: scores.len(),
            });
        }

        let mut selectable = false;
        for (score, &valid) in scores.iter_mut().zip(mask) {
            if !valid {
                *score = f64::NEG_INFINITY;
            } else if score.is_nan() || *score == f64::INFINITY {
                return Err(EngineError::NonFinite { what: "score" });
            } else if score.is_finite() {
                selectable = true;
            }
        }

        if !selectable {
            return Err(EngineError::NothingSelectable);
        }
        Ok(scores)
    }

    fn check_params(&self, params: &[f64]) -> Result<(), EngineError> {
        if params.len() != self.config.param_dim {
            return Err(EngineError::ParamShape {
                expected: self.config.param_dim,
                actual: params.len(),
            });
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(EngineError::NonFinite { what: "parameter" });
        }
        Ok(())
    }

    fn report(
        &self,
        context: &AgentContext,
        outcome: CycleOutcome,
        elapsed: Duration,
        synthesized: Vec<TraceProposal>,
        shield: &ShieldReport,
        returned: &[Proposal],
    ) {
        let avg_confidence = (!returned.is_empty())
            .then(|| returned.iter().map(|p| p.confidence).sum::<f64>() / returned.len() as f64);

        self.observer.on_cycle(&CycleReport {
            outcome,
            elapsed,
            synthesized: synthesized.len(),
            approved: shield.approved,
            blocked: shield.blocked(),
            returned: returned.len(),
            avg_confidence,
        });

        let mut trace = DecisionTrace::new(context.fsm_state, context.health_ok(), outcome, elapsed);
        trace.proposals = synthesized;
        self.telemetry.publish(trace);

        tracing::debug!(
            outcome = ?outcome,
            elapsed_ms = millis(elapsed),
            approved = shield.approved,
            returned = returned.len(),
            "decision cycle finished"
        );
    }
}

fn checked_priority(priority: f64) -> Result<f64, EngineError> {
    if !priority.is_finite() {
        return Err(EngineError::NonFinite { what: "priority" });
    }
    Ok(priority.clamp(0.0, 1.0))
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
