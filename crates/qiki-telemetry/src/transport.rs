//! Trace transports
//!
//! A transport is owned by the publisher's worker thread and may block; the
//! decision path never calls it directly.

use crate::error::{Result, TelemetryError};
use crate::trace::DecisionTrace;

/// Destination for decision traces
pub trait TraceTransport: Send {
    fn name(&self) -> &str;

    fn send(&mut self, trace: &DecisionTrace) -> Result<()>;
}

/// Publishes JSON traces to a NATS subject
pub struct NatsTransport {
    connection: nats::Connection,
    subject: String,
}

impl NatsTransport {
    pub const DEFAULT_SUBJECT: &'static str = "qiki.neural.proposals";

    /// Connect once. A failed connection is reported, not retried.
    pub fn connect(url: &str, subject: impl Into<String>) -> Result<Self> {
        let connection = nats::Options::new()
            .with_name("qiki-ne")
            .connect(url)
            .map_err(|source| TelemetryError::Connect {
                url: url.to_string(),
                source,
            })?;

        tracing::info!(url, "connected to NATS");

        Ok(Self {
            connection,
            subject: subject.into(),
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl TraceTransport for NatsTransport {
    fn name(&self) -> &str {
        "nats"
    }

    fn send(&mut self, trace: &DecisionTrace) -> Result<()> {
        let payload = trace.to_json()?;
        self.connection
            .publish(&self.subject, payload)
            .map_err(TelemetryError::Publish)
    }
}

/// Writes each trace as one JSON line through `tracing`
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

impl TraceTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&mut self, trace: &DecisionTrace) -> Result<()> {
        let json = serde_json::to_string(trace)?;
        tracing::info!(target: "qiki_ne::trace", trace = %json);
        Ok(())
    }
}
