//! Run state and merge policies
//!
//! One `RunState` exists per incoming query, owned exclusively by the engine
//! for the lifetime of that run. Phase handlers never mutate state directly;
//! they return a `StateDelta` that the engine merges. List-typed fields use
//! append-merge, scalar and map fields use replace-merge, and the reasoning
//! log is append-only.

use crate::oracle::types::{Diagnosis, GateDecision, Mismatch, Recommendation, Strategy};
use crate::session::Turn;
use crate::worker::WorkerOutput;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Outcome of the consistency review phase, including requery bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewOutcome {
    /// Whether all workers used the requested parameters
    pub consistent: bool,
    /// Whether another requery round should run
    pub requery_needed: bool,
    /// Whether the requery budget was exhausted
    pub max_retries_reached: bool,
    /// Per-worker disagreements
    pub mismatches: Vec<Mismatch>,
    /// Time period each worker evidently used
    pub worker_time_periods: BTreeMap<String, String>,
}

/// A taken early exit: validation is skipped and the run responds directly
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyExit {
    /// Why the exit was taken
    pub reason: String,
    /// Response text overriding the diagnosis summary, if any
    pub response: Option<String>,
    /// Confidence to report for the exit response
    pub confidence: f64,
}

/// Accumulated state of one orchestration run
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// The user's query (immutable input)
    pub query: String,
    /// Conversation session (immutable input)
    pub session_id: Option<Uuid>,
    /// Requesting user (immutable input)
    pub user_id: String,
    /// Recent conversation turns (immutable input)
    pub history: Vec<Turn>,

    /// Strategy produced by the resolver
    pub strategy: Option<Strategy>,
    /// Clarification question when the resolver could not select workers
    pub clarification: Option<String>,
    /// Gate decision
    pub gate: Option<GateDecision>,
    /// Successful worker outputs, keyed by worker name
    pub worker_results: BTreeMap<String, WorkerOutput>,
    /// Failed worker invocations, keyed by worker name
    pub worker_errors: BTreeMap<String, String>,
    /// Latest consistency review outcome
    pub review: Option<ReviewOutcome>,
    /// Requery rounds spent so far
    pub requery_count: u32,
    /// Diagnosis produced by coordination
    pub diagnosis: Option<Diagnosis>,
    /// Recommendations produced by coordination
    pub recommendations: Vec<Recommendation>,
    /// Coordinator's confidence in the recommendations
    pub recommendation_confidence: f64,
    /// Recommendations that survived validation
    pub validated_recommendations: Vec<Recommendation>,
    /// Validation warnings (rendered under "Notes")
    pub validation_warnings: Vec<String>,
    /// Early exit taken after coordination, if any
    pub early_exit: Option<EarlyExit>,
    /// Visible error message when an oracle failure degraded the run
    pub degraded: Option<String>,
    /// Assembled response text
    pub final_response: Option<String>,
    /// Overall response confidence
    pub confidence: f64,
    /// Append-only trace; every phase contributes at least one entry
    pub reasoning_log: Vec<String>,
}

impl RunState {
    /// Create the initial state for one run
    pub fn new(
        query: impl Into<String>,
        session_id: Option<Uuid>,
        user_id: impl Into<String>,
        history: Vec<Turn>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id,
            user_id: user_id.into(),
            history,
            ..Self::default()
        }
    }

    /// Merge a phase delta into the state
    pub fn apply(&mut self, delta: StateDelta) {
        if let Some(strategy) = delta.strategy {
            self.strategy = Some(strategy);
        }
        if let Some(clarification) = delta.clarification {
            self.clarification = Some(clarification);
        }
        if let Some(gate) = delta.gate {
            self.gate = Some(gate);
        }
        if let Some(results) = delta.worker_results {
            self.worker_results = results;
        }
        if let Some(errors) = delta.worker_errors {
            self.worker_errors = errors;
        }
        if let Some(review) = delta.review {
            self.review = Some(review);
        }
        if let Some(count) = delta.requery_count {
            self.requery_count = count;
        }
        if let Some(diagnosis) = delta.diagnosis {
            self.diagnosis = Some(diagnosis);
        }
        self.recommendations.extend(delta.recommendations);
        if let Some(confidence) = delta.recommendation_confidence {
            self.recommendation_confidence = confidence;
        }
        self.validated_recommendations
            .extend(delta.validated_recommendations);
        self.validation_warnings.extend(delta.validation_warnings);
        if let Some(early_exit) = delta.early_exit {
            self.early_exit = Some(early_exit);
        }
        if let Some(degraded) = delta.degraded {
            self.degraded = Some(degraded);
        }
        if let Some(response) = delta.final_response {
            self.final_response = Some(response);
        }
        if let Some(confidence) = delta.confidence {
            self.confidence = confidence;
        }
        self.reasoning_log.extend(delta.reasoning);
    }

    /// Workers approved by the gate (empty before the gate phase)
    pub fn approved_workers(&self) -> Vec<String> {
        self.gate
            .as_ref()
            .map(|gate| gate.approved_workers.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Partial update produced by one phase handler
#[derive(Debug, Default)]
pub struct StateDelta {
    /// Replace the strategy
    pub strategy: Option<Strategy>,
    /// Replace the clarification question
    pub clarification: Option<String>,
    /// Replace the gate decision
    pub gate: Option<GateDecision>,
    /// Replace the worker result map
    pub worker_results: Option<BTreeMap<String, WorkerOutput>>,
    /// Replace the worker error map
    pub worker_errors: Option<BTreeMap<String, String>>,
    /// Replace the review outcome
    pub review: Option<ReviewOutcome>,
    /// Replace the requery count
    pub requery_count: Option<u32>,
    /// Replace the diagnosis
    pub diagnosis: Option<Diagnosis>,
    /// Append recommendations
    pub recommendations: Vec<Recommendation>,
    /// Replace the recommendation confidence
    pub recommendation_confidence: Option<f64>,
    /// Append validated recommendations
    pub validated_recommendations: Vec<Recommendation>,
    /// Append validation warnings
    pub validation_warnings: Vec<String>,
    /// Replace the early exit marker
    pub early_exit: Option<EarlyExit>,
    /// Replace the degraded-run message
    pub degraded: Option<String>,
    /// Replace the final response
    pub final_response: Option<String>,
    /// Replace the overall confidence
    pub confidence: Option<f64>,
    /// Append reasoning entries
    pub reasoning: Vec<String>,
}

impl StateDelta {
    /// Delta carrying only a reasoning entry
    pub fn reasoning(entry: impl Into<String>) -> Self {
        Self {
            reasoning: vec![entry.into()],
            ..Self::default()
        }
    }

    /// Delta that degrades the run with a visible error message
    pub fn degraded(message: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            degraded: Some(message.into()),
            reasoning: vec![reasoning.into()],
            ..Self::default()
        }
    }
}
