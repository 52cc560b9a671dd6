use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use qiki_engine::{
    CycleOutcome, CycleReport, DecisionTrace, EngineConfig, EngineObserver, FeatureWindow,
    NeuralEngine, ScoreError, ScoreOutput, Scorer, StaticScorer,
};
use qiki_telemetry::TelemetrySink;
use qiki_types::{
    ActionCatalog, ActionSpec, AgentContext, FsmState, PipelineConfig, Proposal, QikiError,
};

// =============================================================================
// Doubles
// =============================================================================

#[derive(Default)]
struct RecordingObserver {
    reports: Mutex<Vec<CycleReport>>,
}

impl RecordingObserver {
    fn last(&self) -> CycleReport {
        self.reports.lock().last().cloned().expect("no cycle reported")
    }
}

impl EngineObserver for RecordingObserver {
    fn on_cycle(&self, report: &CycleReport) {
        self.reports.lock().push(report.clone());
    }
}

#[derive(Default)]
struct RecordingSink {
    traces: Mutex<Vec<DecisionTrace>>,
}

impl TelemetrySink for RecordingSink {
    fn publish(&self, trace: DecisionTrace) {
        self.traces.lock().push(trace);
    }
}

struct FailingScorer;

impl Scorer for FailingScorer {
    fn score(&self, _: &FeatureWindow, _: &[bool]) -> Result<ScoreOutput, ScoreError> {
        Err(ScoreError::Unavailable("model not loaded".to_string()))
    }
}

struct PanickingScorer;

impl Scorer for PanickingScorer {
    fn score(&self, _: &FeatureWindow, _: &[bool]) -> Result<ScoreOutput, ScoreError> {
        panic!("tensor shape mismatch")
    }
}

/// Returns a fixed output without applying the mask
struct RawScorer(ScoreOutput);

impl Scorer for RawScorer {
    fn score(&self, _: &FeatureWindow, _: &[bool]) -> Result<ScoreOutput, ScoreError> {
        Ok(self.0.clone())
    }
}

struct SlowScorer {
    delay: Duration,
    inner: StaticScorer,
}

impl Scorer for SlowScorer {
    fn score(&self, features: &FeatureWindow, mask: &[bool]) -> Result<ScoreOutput, ScoreError> {
        thread::sleep(self.delay);
        self.inner.score(features, mask)
    }
}

struct InputRecordingScorer {
    seen: Arc<Mutex<Option<((usize, usize), Vec<bool>)>>>,
    inner: StaticScorer,
}

impl Scorer for InputRecordingScorer {
    fn score(&self, features: &FeatureWindow, mask: &[bool]) -> Result<ScoreOutput, ScoreError> {
        *self.seen.lock() = Some((features.shape(), mask.to_vec()));
        self.inner.score(features, mask)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn pipeline() -> PipelineConfig {
    PipelineConfig {
        time_budget_ms: 1_000,
        ..PipelineConfig::default()
    }
}

fn mock_catalog() -> Arc<ActionCatalog> {
    Arc::new(
        ActionCatalog::new(vec![
            ActionSpec::new("HOLD_POSITION"),
            ActionSpec::new("COOLING_BOOST"),
        ])
        .unwrap(),
    )
}

fn throttle_catalog() -> Arc<ActionCatalog> {
    Arc::new(
        ActionCatalog::new(vec![ActionSpec::new("THROTTLE_UP").with_param("level", 0.0, 1.0)]).unwrap(),
    )
}

/// Favors HOLD_POSITION strongly enough to clear the default 0.55 floor
fn hold_scorer() -> StaticScorer {
    StaticScorer::new(vec![2.0, 0.5, 0.0, 0.0, 0.0, 0.0], 0.7, vec![0.0; 4])
}

struct Harness {
    engine: NeuralEngine,
    observer: Arc<RecordingObserver>,
    sink: Arc<RecordingSink>,
}

fn harness(pipeline: PipelineConfig, catalog: Arc<ActionCatalog>, scorer: impl Scorer + 'static) -> Harness {
    let observer = Arc::new(RecordingObserver::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = NeuralEngine::new(
        EngineConfig::new(pipeline, catalog, Box::new(scorer))
            .with_observer(observer.clone())
            .with_telemetry(sink.clone()),
    )
    .unwrap();
    Harness { engine, observer, sink }
}

fn active() -> AgentContext {
    AgentContext::new(FsmState::Active, true)
}

fn actions(proposals: &[Proposal]) -> Vec<&str> {
    proposals.iter().filter_map(|p| p.primary_action()).collect()
}

// =============================================================================
// Decision cycles
// =============================================================================

#[test]
fn test_nominal_cycle_proposes_hold_position() {
    let h = harness(pipeline(), mock_catalog(), hold_scorer());

    let proposals = h.engine.generate_proposals(&active());

    assert_eq!(actions(&proposals), vec!["HOLD_POSITION"]);
    let proposal = &proposals[0];
    assert_eq!(proposal.proposal_id, "ne_0");
    assert_eq!(proposal.source_module_id, "NeuralEngineV1");
    assert!(proposal.confidence >= 0.55);
    assert_eq!(proposal.priority, 0.7);

    let report = h.observer.last();
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.returned, 1);
    assert_eq!(report.avg_confidence, Some(proposal.confidence));
}

#[test]
fn test_error_state_locks_out() {
    let h = harness(pipeline(), mock_catalog(), hold_scorer());

    let proposals = h
        .engine
        .generate_proposals(&AgentContext::new(FsmState::ErrorState, true));

    assert!(proposals.is_empty());
    let report = h.observer.last();
    assert_eq!(report.outcome, CycleOutcome::LockedOut);
    assert_eq!(report.blocked, 1);
    assert!(h.engine.shield().history().is_empty());
}

#[test]
fn test_unhealthy_agent_locks_out() {
    let h = harness(pipeline(), mock_catalog(), hold_scorer());

    let proposals = h.engine.generate_proposals(&AgentContext::new(FsmState::Active, false));

    assert!(proposals.is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::LockedOut);
}

#[test]
fn test_scorer_error_degrades_to_empty() {
    let h = harness(pipeline(), mock_catalog(), FailingScorer);

    for _ in 0..3 {
        assert!(h.engine.generate_proposals(&active()).is_empty());
    }

    let reports = h.observer.reports.lock();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.outcome == CycleOutcome::Fault));
}

#[test]
fn test_scorer_panic_degrades_to_empty() {
    let h = harness(pipeline(), mock_catalog(), PanickingScorer);

    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::Fault);
}

#[test]
fn test_deadline_overrun_discards_approved_proposals() {
    let config = PipelineConfig {
        time_budget_ms: 5,
        ..PipelineConfig::default()
    };
    let scorer = SlowScorer {
        delay: Duration::from_millis(20),
        inner: hold_scorer(),
    };
    let h = harness(config, mock_catalog(), scorer);

    let proposals = h.engine.generate_proposals(&active());

    assert!(proposals.is_empty());
    let report = h.observer.last();
    assert_eq!(report.outcome, CycleOutcome::DeadlineExceeded);
    assert!(report.approved >= 1);
    assert_eq!(report.returned, 0);
    assert!(report.elapsed >= Duration::from_millis(20));
}

// =============================================================================
// Scorer output contract
// =============================================================================

#[test]
fn test_nan_score_is_a_fault() {
    let scorer = StaticScorer::new(vec![f64::NAN, 0.5, 0.0, 0.0, 0.0, 0.0], 0.5, vec![0.0; 4]);
    let h = harness(pipeline(), mock_catalog(), scorer);

    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::Fault);
}

#[test]
fn test_positive_infinity_is_a_fault() {
    let scorer = StaticScorer::new(vec![f64::INFINITY, 0.5, 0.0, 0.0, 0.0, 0.0], 0.5, vec![0.0; 4]);
    let h = harness(pipeline(), mock_catalog(), scorer);

    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::Fault);
}

#[test]
fn test_wrong_score_length_is_a_fault() {
    let scorer = StaticScorer::new(vec![2.0, 0.5], 0.5, vec![0.0; 4]);
    let h = harness(pipeline(), mock_catalog(), scorer);

    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::Fault);
}

#[test]
fn test_wrong_param_length_is_a_fault() {
    let scorer = StaticScorer::new(vec![2.0, 0.5, 0.0, 0.0, 0.0, 0.0], 0.5, vec![0.0; 2]);
    let h = harness(pipeline(), mock_catalog(), scorer);

    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::Fault);
}

#[test]
fn test_all_masked_scores_are_a_fault() {
    let scorer = StaticScorer::new(
        vec![f64::NEG_INFINITY, f64::NEG_INFINITY, 0.0, 0.0, 0.0, 0.0],
        0.5,
        vec![0.0; 4],
    );
    let h = harness(pipeline(), mock_catalog(), scorer);

    assert!(h.engine.generate_proposals(&active()).is_empty());
    assert_eq!(h.observer.last().outcome, CycleOutcome::Fault);
}

#[test]
fn test_mask_enforced_when_scorer_ignores_it() {
    let scorer = RawScorer(ScoreOutput {
        scores: vec![1.0, 0.0, 0.0, 50.0, 0.0, 0.0],
        priority: 0.5,
        params: vec![0.0; 4],
    });
    let h = harness(pipeline(), mock_catalog(), scorer);

    let proposals = h.engine.generate_proposals(&active());

    assert_eq!(actions(&proposals), vec!["HOLD_POSITION"]);
    assert_eq!(proposals[0].proposal_id, "ne_0");
}

#[test]
fn test_scorer_sees_window_and_catalog_mask() {
    let seen = Arc::new(Mutex::new(None));
    let scorer = InputRecordingScorer {
        seen: seen.clone(),
        inner: hold_scorer(),
    };
    let h = harness(pipeline(), mock_catalog(), scorer);

    h.engine.generate_proposals(&active());

    let (shape, mask) = seen.lock().clone().unwrap();
    assert_eq!(shape, (16, 32));
    assert_eq!(mask, vec![true, true, false, false, false, false]);
}

#[test]
fn test_priority_clamped_into_unit_range() {
    let scorer = StaticScorer::new(vec![2.0, 0.5, 0.0, 0.0, 0.0, 0.0], 3.0, vec![0.0; 4]);
    let h = harness(pipeline(), mock_catalog(), scorer);

    let proposals = h.engine.generate_proposals(&active());

    assert_eq!(proposals[0].priority, 1.0);
}

// =============================================================================
// Shield and ranking through the engine
// =============================================================================

#[test]
fn test_third_consecutive_repeat_suppressed() {
    let h = harness(pipeline(), mock_catalog(), hold_scorer());

    assert_eq!(h.engine.generate_proposals(&active()).len(), 1);
    assert_eq!(h.engine.generate_proposals(&active()).len(), 1);
    assert!(h.engine.generate_proposals(&active()).is_empty());

    let report = h.observer.last();
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.blocked, 1);
}

#[test]
fn test_params_attached_and_bounded() {
    let config = PipelineConfig {
        num_classes: 1,
        ..pipeline()
    };

    let within = harness(
        config.clone(),
        throttle_catalog(),
        StaticScorer::new(vec![1.0], 0.5, vec![0.4, 9.0, 9.0, 9.0]),
    );
    let proposals = within.engine.generate_proposals(&active());
    assert_eq!(actions(&proposals), vec!["THROTTLE_UP"]);
    assert_eq!(proposals[0].proposed_actions[0].params["level"], 0.4);
    assert_eq!(proposals[0].proposed_actions[0].params.len(), 1);

    let beyond = harness(
        config,
        throttle_catalog(),
        StaticScorer::new(vec![1.0], 0.5, vec![1.5, 0.0, 0.0, 0.0]),
    );
    assert!(beyond.engine.generate_proposals(&active()).is_empty());
    assert_eq!(beyond.observer.last().blocked, 1);
}

#[test]
fn test_ranking_stage_can_be_disabled() {
    let scorer = || StaticScorer::new(vec![2.0, 0.5, 0.0, 0.0, 0.0, 0.0], 0.5, vec![0.0; 4]);
    let loose = PipelineConfig {
        min_confidence: 0.1,
        ..pipeline()
    };

    let ranked = harness(loose.clone(), mock_catalog(), scorer());
    assert_eq!(actions(&ranked.engine.generate_proposals(&active())), vec!["HOLD_POSITION"]);

    let unranked = harness(
        PipelineConfig {
            evaluate: false,
            ..loose
        },
        mock_catalog(),
        scorer(),
    );
    assert_eq!(
        actions(&unranked.engine.generate_proposals(&active())),
        vec!["HOLD_POSITION", "COOLING_BOOST"]
    );
}

// =============================================================================
// Telemetry and construction
// =============================================================================

#[test]
fn test_trace_published_every_cycle() {
    let h = harness(pipeline(), mock_catalog(), hold_scorer());

    h.engine.generate_proposals(&active());
    h.engine
        .generate_proposals(&AgentContext::new(FsmState::ErrorState, false));

    let traces = h.sink.traces.lock();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].outcome, CycleOutcome::Completed);
    assert_eq!(traces[0].fsm_state, FsmState::Active);
    assert_eq!(traces[0].proposals.len(), 1);
    assert_eq!(traces[0].proposals[0].action.as_deref(), Some("HOLD_POSITION"));
    assert_eq!(traces[1].outcome, CycleOutcome::LockedOut);
    assert!(!traces[1].health_ok);
    assert_ne!(traces[0].cycle_id, traces[1].cycle_id);
}

#[test]
fn test_fault_trace_has_no_proposals() {
    let h = harness(pipeline(), mock_catalog(), FailingScorer);

    h.engine.generate_proposals(&active());

    let traces = h.sink.traces.lock();
    assert_eq!(traces[0].outcome, CycleOutcome::Fault);
    assert!(traces[0].proposals.is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let config = PipelineConfig {
        topk: 0,
        ..PipelineConfig::default()
    };
    let result = NeuralEngine::new(EngineConfig::new(config, mock_catalog(), Box::new(hold_scorer())));

    assert!(matches!(
        result,
        Err(qiki_engine::EngineError::Config(QikiError::InvalidConfig { .. }))
    ));
}

#[test]
fn test_empty_catalog_rejected() {
    let catalog = Arc::new(ActionCatalog::new(Vec::new()).unwrap());
    let result = NeuralEngine::new(EngineConfig::new(
        PipelineConfig::default(),
        catalog,
        Box::new(hold_scorer()),
    ));

    assert!(result.is_err());
}

#[test]
fn test_engine_shared_across_threads() {
    let h = harness(pipeline(), mock_catalog(), hold_scorer());
    let engine = Arc::new(h.engine);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.generate_proposals(&active()).len())
        })
        .collect();
    let approved: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(approved, 2);
}
