//! HTTP API handlers
//!
//! Thin surface over the workflow engine: a chat endpoint (JSON and SSE
//! variants), a worker listing and health checks. All orchestration behavior
//! lives in the engine; handlers only validate input, thread session history
//! and shape responses.

pub mod chat;
pub mod workers;

use crate::engine::Engine;
use crate::session::SessionStore;
use crate::worker::WorkerRegistry;
use std::sync::Arc;

/// Shared state injected into every handler
#[derive(Clone)]
pub struct ApiContext {
    /// The workflow engine
    pub engine: Arc<Engine>,
    /// Conversation history store
    pub sessions: Arc<dyn SessionStore>,
    /// Worker registry (for listing endpoints)
    pub registry: Arc<WorkerRegistry>,
}
