//! Analysis workers
//!
//! A worker is an independent, stateless unit that answers part of a query
//! given normalized parameters. Workers are resolved by name from a registry
//! built at startup; adding a worker is a registration, not a branch in the
//! engine.

pub mod llm;
pub mod registry;

pub use registry::WorkerRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during worker invocation
///
/// The engine maps any failure mode - including panics and timeouts inside
/// the fan-out supervisor - into one of these variants; no worker failure
/// ever aborts sibling workers or the run.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker execution failed
    #[error("Worker execution failed: {0}")]
    Failed(String),

    /// Worker invocation exceeded the timeout limit
    #[error("Worker timed out after {0} seconds")]
    Timeout(u64),

    /// Worker task panicked or was cancelled before settling
    #[error("Worker task aborted: {0}")]
    Aborted(String),

    /// No worker is registered under the requested name
    #[error("Worker not registered: {0}")]
    NotRegistered(String),
}

/// Input to a worker invocation
#[derive(Debug, Clone)]
pub struct WorkerInput {
    /// The instruction composed by the engine (query plus normalized
    /// parameters and coordination context)
    pub message: String,
    /// Conversation session, if any
    pub session_id: Option<Uuid>,
    /// Requesting user
    pub user_id: String,
    /// Structured context values (intent, date range, comparison mode, ...)
    pub context: HashMap<String, serde_json::Value>,
}

/// Output from a worker invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerOutput {
    /// The worker's answer text
    pub response: String,
    /// The worker's self-reported confidence in [0, 1]
    pub confidence: f64,
    /// Names of the tools the worker used while answering
    pub tools_used: Vec<String>,
}

/// A callable unit of analysis work
///
/// Implementations must be safe to share across concurrent runs: the engine
/// treats workers as read-only and invokes them from spawned tasks.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Registry name of this worker
    fn name(&self) -> &str;

    /// One-line description shown to the strategy resolver and the API
    fn description(&self) -> &str;

    /// Perform the work for one invocation
    async fn invoke(&self, input: WorkerInput) -> Result<WorkerOutput, WorkerError>;
}

/// Name and description pair advertised to the strategy resolver
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkerDescriptor {
    /// Registry name
    pub name: String,
    /// One-line description
    pub description: String,
}
