//! Workflow graph topology
//!
//! The orchestration flow is a fixed set of named phases connected by
//! directed edges. Unconditional edges point at a fixed next phase;
//! conditional edges evaluate a pure decision function over the accumulated
//! run state. The topology is built once at engine construction and injected
//! - never mutated per-run. The only backward edge is the requery cycle
//! (`Review -> Requery -> Review`), bounded by the requery budget enforced in
//! the review handler.

use crate::engine::state::RunState;
use std::collections::HashMap;

/// Phase identifiers in the workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Strategy resolution: select workers, normalize parameters
    Analysis,
    /// Business-rule gate over the proposed worker set
    Gate,
    /// Concurrent fan-out to all approved workers
    FanOut,
    /// Consistency review of worker results
    Review,
    /// Bounded re-invocation with restated parameters
    Requery,
    /// Diagnosis and recommendation synthesis
    Coordination,
    /// Recommendation sanity check
    Validation,
    /// Deterministic response assembly
    Respond,
}

impl Phase {
    /// Stable name used in progress events and logs
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Analysis => "analysis",
            Phase::Gate => "gate",
            Phase::FanOut => "invoke_workers",
            Phase::Review => "review",
            Phase::Requery => "requery",
            Phase::Coordination => "coordination",
            Phase::Validation => "validation",
            Phase::Respond => "respond",
        }
    }
}

/// Outgoing edge of a phase
pub enum Edge {
    /// Unconditional transition
    To(Phase),
    /// Conditional transition decided over the current run state
    Branch(fn(&RunState) -> Phase),
    /// Terminal phase: the run ends after this phase executes
    End,
}

/// The fixed phase topology
pub struct WorkflowGraph {
    entry: Phase,
    edges: HashMap<Phase, Edge>,
}

impl WorkflowGraph {
    /// Build the standard orchestration topology
    pub fn standard() -> Self {
        let mut edges = HashMap::new();
        edges.insert(Phase::Analysis, Edge::Branch(after_analysis));
        edges.insert(Phase::Gate, Edge::Branch(after_gate));
        edges.insert(Phase::FanOut, Edge::To(Phase::Review));
        edges.insert(Phase::Review, Edge::Branch(after_review));
        edges.insert(Phase::Requery, Edge::To(Phase::Review));
        edges.insert(Phase::Coordination, Edge::Branch(after_coordination));
        edges.insert(Phase::Validation, Edge::To(Phase::Respond));
        edges.insert(Phase::Respond, Edge::End);

        Self {
            entry: Phase::Analysis,
            edges,
        }
    }

    /// Entry phase of the graph
    pub fn entry(&self) -> Phase {
        self.entry
    }

    /// Evaluate the outgoing edge of `phase`; `None` means the run is done
    pub fn next(&self, phase: Phase, state: &RunState) -> Option<Phase> {
        match self.edges.get(&phase) {
            Some(Edge::To(next)) => Some(*next),
            Some(Edge::Branch(decide)) => Some(decide(state)),
            Some(Edge::End) | None => None,
        }
    }
}

/// After analysis: clarification or oracle failure short-circuits to the
/// response, otherwise proceed to the gate.
fn after_analysis(state: &RunState) -> Phase {
    if state.clarification.is_some() || state.degraded.is_some() {
        Phase::Respond
    } else {
        Phase::Gate
    }
}

/// After the gate: blocked (or degraded) runs skip straight to the response.
fn after_gate(state: &RunState) -> Phase {
    match &state.gate {
        Some(gate) if gate.valid && state.degraded.is_none() => Phase::FanOut,
        _ => Phase::Respond,
    }
}

/// After review: requery only while the reviewer asked for it.
fn after_review(state: &RunState) -> Phase {
    match &state.review {
        Some(review) if review.requery_needed => Phase::Requery,
        _ => Phase::Coordination,
    }
}

/// After coordination: an early exit (taken by the handler) or a degraded
/// run skips validation.
fn after_coordination(state: &RunState) -> Phase {
    if state.early_exit.is_some() || state.degraded.is_some() {
        Phase::Respond
    } else {
        Phase::Validation
    }
}
