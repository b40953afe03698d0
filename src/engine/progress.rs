//! Progress events
//!
//! The engine can emit `(phase, status, details)` events to an observer
//! without blocking phase execution. Sends are fire-and-forget: a closed or
//! failed receiver never affects the run.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Status of a phase from the observer's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Phase execution has begun
    Started,
    /// Phase is making progress (e.g., individual workers completing)
    Running,
    /// Phase execution has finished
    Completed,
}

/// One progress event
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Phase name
    pub phase: String,
    /// Phase status
    pub status: ProgressStatus,
    /// Phase-specific details
    pub details: serde_json::Value,
}

/// Non-blocking progress emitter
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// Sink that forwards events to the given channel
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops all events
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event; failures are ignored
    pub fn emit(&self, phase: &str, status: ProgressStatus, details: serde_json::Value) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                phase: phase.to_string(),
                status,
                details,
            });
        }
    }
}
