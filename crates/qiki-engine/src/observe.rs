//! Cycle observation and metrics
//!
//! The engine owns no global state for observability. An [`EngineObserver`]
//! is passed in at construction and receives one report per cycle.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

use qiki_telemetry::CycleOutcome;

pub const INFERENCE_TOTAL: &str = "ne_inference_total";
pub const INFERENCE_DURATION: &str = "ne_inference_duration_seconds";
pub const ACTIVE_PROPOSALS: &str = "ne_active_proposals";
pub const AVG_CONFIDENCE: &str = "ne_avg_confidence";
pub const SAFETY_BLOCKS: &str = "ne_safety_blocks_total";
pub const DEGRADATIONS: &str = "ne_degradation_total";

/// Summary of one decision cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub elapsed: Duration,
    /// Candidates synthesized from the scorer output
    pub synthesized: usize,
    /// Candidates the safety shield approved
    pub approved: usize,
    /// Candidates the safety shield dropped, lockout included
    pub blocked: usize,
    /// Proposals handed back to the caller
    pub returned: usize,
    /// Mean confidence of the returned proposals
    pub avg_confidence: Option<f64>,
}

pub trait EngineObserver: Send + Sync {
    fn on_cycle(&self, report: &CycleReport);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {
    fn on_cycle(&self, _report: &CycleReport) {}
}

/// Publishes cycle reports through the `metrics` facade
///
/// Whatever recorder the host installs (Prometheus in the decision service)
/// receives the values; without a recorder they are no-ops.
#[derive(Debug, Clone, Copy)]
pub struct MetricsObserver;

impl MetricsObserver {
    pub fn new() -> Self {
        describe_counter!(INFERENCE_TOTAL, "Total inference calls");
        describe_histogram!(INFERENCE_DURATION, Unit::Seconds, "Inference latency");
        describe_gauge!(ACTIVE_PROPOSALS, "Number of proposals returned by the last cycle");
        describe_gauge!(AVG_CONFIDENCE, "Average confidence of the last cycle's proposals");
        describe_counter!(SAFETY_BLOCKS, "Proposals dropped by the safety shield");
        describe_counter!(DEGRADATIONS, "Cycles degraded to an empty result by a fault or deadline miss");
        Self
    }
}

impl Default for MetricsObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineObserver for MetricsObserver {
    fn on_cycle(&self, report: &CycleReport) {
        counter!(INFERENCE_TOTAL).increment(1);
        histogram!(INFERENCE_DURATION).record(report.elapsed.as_secs_f64());
        gauge!(ACTIVE_PROPOSALS).set(report.returned as f64);
        gauge!(AVG_CONFIDENCE).set(report.avg_confidence.unwrap_or(0.0));
        if report.blocked > 0 {
            counter!(SAFETY_BLOCKS).increment(report.blocked as u64);
        }
        if report.outcome.is_degraded() {
            counter!(DEGRADATIONS, "outcome" => outcome_label(report.outcome)).increment(1);
        }
    }
}

fn outcome_label(outcome: CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Completed => "completed",
        CycleOutcome::LockedOut => "locked_out",
        CycleOutcome::Fault => "fault",
        CycleOutcome::DeadlineExceeded => "deadline_exceeded",
    }
}
