//! QIKI Telemetry - fire-and-forget decision traces
//!
//! Every decision cycle produces one [`DecisionTrace`]. The engine hands it
//! to a [`TelemetrySink`] and moves on: publication must never block or fail
//! the decision path.
//!
//! [`TelemetryPublisher`] is the production sink. It owns a bounded queue and
//! a background worker that drains it into a [`TraceTransport`] (NATS or the
//! tracing log). Delivery is at-most-once: a full queue or a broken transport
//! drops the trace.

pub mod error;
pub mod publisher;
pub mod trace;
pub mod transport;

pub use error::{Result, TelemetryError};
pub use publisher::{NullSink, TelemetryPublisher, TelemetrySink};
pub use trace::{CycleOutcome, DecisionTrace, TraceProposal};
pub use transport::{LogTransport, NatsTransport, TraceTransport};
