//! Decision oracles
//!
//! The engine consults an opaque decision function at specific phases:
//! strategy resolution, gate validation, consistency review, recommendation
//! coordination, early-exit decision and recommendation validation. Oracles
//! are pure from the engine's perspective: structured input in, structured
//! decision out, no engine state mutated.

pub mod llm;
pub mod types;

pub use types::{
    Coordination, Diagnosis, ExitDecision, GateDecision, Mismatch, NormalizedParams, Priority,
    Recommendation, ReviewContext, ReviewFindings, Severity, Strategy, StrategyDecision,
    ValidationOutcome,
};

use crate::llm::GenerateError;
use crate::session::Turn;
use crate::worker::{WorkerDescriptor, WorkerOutput};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors that can occur during an oracle call
#[derive(Error, Debug)]
pub enum OracleError {
    /// The underlying transport (HTTP call) failed
    #[error("Oracle transport failed: {0}")]
    Transport(#[from] GenerateError),

    /// The oracle produced output that does not parse as a decision
    #[error("Oracle returned a malformed decision: {0}")]
    Malformed(String),
}

/// The decision interface consulted by the workflow engine
///
/// Each method corresponds to one phase boundary. Implementations may be
/// model-backed, rule-based or scripted (tests); the engine only depends on
/// the typed decisions.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Resolve which workers should answer the query and with which
    /// normalized parameters, or ask for clarification
    async fn resolve_strategy(
        &self,
        query: &str,
        history: &[Turn],
        available: &[WorkerDescriptor],
    ) -> Result<StrategyDecision, OracleError>;

    /// Apply business rules to the proposed worker set
    async fn validate_gate(
        &self,
        query: &str,
        selected: &BTreeSet<String>,
        confidence: f64,
        user_id: &str,
    ) -> Result<GateDecision, OracleError>;

    /// Check whether each worker's response used the requested parameters
    async fn review_consistency(
        &self,
        results: &BTreeMap<String, WorkerOutput>,
        expected: &NormalizedParams,
    ) -> Result<ReviewFindings, OracleError>;

    /// Synthesize a diagnosis and prioritized recommendations from all
    /// worker outputs
    async fn coordinate(
        &self,
        results: &BTreeMap<String, WorkerOutput>,
        query: &str,
        history: &[Turn],
        gate_warnings: &[String],
        review: &ReviewContext,
    ) -> Result<Coordination, OracleError>;

    /// Decide whether validation can be skipped entirely
    async fn decide_early_exit(
        &self,
        diagnosis: &Diagnosis,
        results: &BTreeMap<String, WorkerOutput>,
        query: &str,
    ) -> Result<ExitDecision, OracleError>;

    /// Sanity-check recommendations against the diagnosis and raw worker data
    async fn validate_recommendations(
        &self,
        recommendations: &[Recommendation],
        diagnosis: &Diagnosis,
        results: &BTreeMap<String, WorkerOutput>,
    ) -> Result<ValidationOutcome, OracleError>;
}
