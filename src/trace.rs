//! The trace writer contract (spec.md §6): an external collaborator that
//! records each envelope sent or received, verbatim as its serialized JSON.
//! Only the contract is specified here; a concrete file-based sink is
//! explicitly out of scope (spec.md §1).

/// Which direction an envelope crossed the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    Send,
    Receive,
}

impl TraceDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceDirection::Send => "SEND",
            TraceDirection::Receive => "RECEIVE",
        }
    }
}

/// Observes the raw JSON text of every envelope crossing the transport.
pub trait TraceWriter: Send + Sync {
    fn trace(&self, direction: TraceDirection, envelope_json: &str);
}

/// Discards every trace event.
#[derive(Debug, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn trace(&self, _direction: TraceDirection, _envelope_json: &str) {}
}

/// Emits each trace event as a `tracing` event at `trace` level.
#[derive(Debug, Default)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn trace(&self, direction: TraceDirection, envelope_json: &str) {
        tracing::trace!(direction = direction.as_str(), envelope = envelope_json, "lime");
    }
}
