//! Bounded, non-blocking trace publication

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, TelemetryError};
use crate::trace::DecisionTrace;
use crate::transport::TraceTransport;

/// Receiver of one trace per decision cycle
///
/// Implementations must return promptly and must not fail the caller.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, trace: DecisionTrace);
}

/// Discards every trace
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&self, _trace: DecisionTrace) {}
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Queue plus background worker draining into a transport
///
/// `publish` uses `try_send`: a full queue or a stopped worker drops the
/// trace and bumps the dropped counter. There is no retry.
pub struct TelemetryPublisher {
    sender: RwLock<Option<Sender<DecisionTrace>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    capacity: usize,
}

impl TelemetryPublisher {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Start the worker thread for `transport` with a queue of `capacity` traces
    pub fn spawn(mut transport: Box<dyn TraceTransport>, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = flume::bounded::<DecisionTrace>(capacity);
        let counters = Arc::new(Counters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = thread::Builder::new()
            .name("qiki-telemetry".to_string())
            .spawn(move || {
                for trace in receiver.iter() {
                    match transport.send(&trace) {
                        Ok(()) => {
                            worker_counters.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                transport = transport.name(),
                                cycle_id = %trace.cycle_id,
                                error = %err,
                                "trace dropped"
                            );
                        }
                    }
                }
                tracing::debug!(transport = transport.name(), "telemetry worker stopped");
            })
            .map_err(TelemetryError::Spawn)?;

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Traces the transport accepted
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Traces the transport failed to send
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Traces never queued (queue full or publisher shut down)
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue, let the worker drain what is queued, and join it
    pub fn shutdown(&self) {
        self.sender.write().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!("telemetry worker panicked");
            }
        }
    }
}

impl TelemetrySink for TelemetryPublisher {
    fn publish(&self, trace: DecisionTrace) {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match sender.try_send(trace) {
            Ok(()) => {}
            Err(TrySendError::Full(trace)) | Err(TrySendError::Disconnected(trace)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(cycle_id = %trace.cycle_id, "telemetry queue unavailable, trace dropped");
            }
        }
    }
}

impl Drop for TelemetryPublisher {
    fn drop(&mut self) {
        // Detach rather than join: a stuck transport must not hang the owner.
        self.sender.get_mut().take();
    }
}
