//! Structured decision types
//!
//! Every oracle call crosses the engine boundary as one of these typed
//! decisions. The engine never inspects raw oracle output; any parsing lives
//! in the adapter that produced the decision.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Normalized query parameters shared by every approved worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedParams {
    /// Symbolic time period (e.g., "last_7_days", "current_month", "custom")
    pub time_period: String,
    /// Concrete range start, when resolved
    pub start_date: Option<NaiveDate>,
    /// Concrete range end, when resolved
    pub end_date: Option<NaiveDate>,
}

impl NormalizedParams {
    /// Human-readable restatement used in worker instructions and requeries
    pub fn describe(&self) -> String {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => format!("dates {} to {} (inclusive)", start, end),
            _ if !self.time_period.is_empty() => format!("time period {}", self.time_period),
            _ => "no specific time period".to_string(),
        }
    }
}

/// Coordinated strategy produced by the strategy resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Workers selected to answer the query
    pub selected_workers: BTreeSet<String>,
    /// Short statement of what the user wants to know
    pub intent: String,
    /// Normalized parameters all workers must use
    pub params: NormalizedParams,
    /// Whether the query compares multiple workers/data sources
    pub comparison_mode: bool,
}

/// Outcome of strategy resolution
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyDecision {
    /// A strategy was resolved; proceed through the graph
    Proceed(Strategy),
    /// The query is too unclear to select any worker
    Clarify {
        /// Question to send back to the user
        question: String,
    },
}

/// Outcome of gate validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Subset of the selected workers actually approved
    pub approved_workers: BTreeSet<String>,
    /// Advisory warnings carried into coordination
    pub warnings: Vec<String>,
    /// Whether the request may proceed at all
    pub valid: bool,
    /// Block reason when `valid` is false
    pub reason: Option<String>,
}

/// A parameter disagreement detected by the consistency reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Worker whose response disagrees
    pub worker: String,
    /// Parameters the orchestrator requested
    pub expected: String,
    /// Parameters the worker evidently used
    pub actual: String,
}

/// Outcome of a consistency review round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFindings {
    /// Whether all workers used the requested parameters
    pub consistent: bool,
    /// Per-worker disagreements
    pub mismatches: Vec<Mismatch>,
    /// Time period each worker evidently used
    pub worker_time_periods: BTreeMap<String, String>,
}

/// Severity of the diagnosed situation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Requires immediate action
    Critical,
    /// Significant issue
    High,
    /// Moderate issue
    Medium,
    /// Minor or informational
    Low,
}

impl Severity {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Parse a label, defaulting to `Medium` for anything unrecognized
    pub fn parse_or_medium(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Act first
    High,
    /// Act soon
    Medium,
    /// Act when convenient
    Low,
}

impl Priority {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Parse a label, defaulting to `Medium` for anything unrecognized
    pub fn parse_or_medium(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root-cause analysis over the combined worker results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Identified root causes
    pub root_causes: Vec<String>,
    /// Correlations between worker findings
    pub correlations: Vec<String>,
    /// Overall severity
    pub severity: Severity,
    /// Short prose summary
    pub summary: String,
}

impl Diagnosis {
    /// Minimal diagnosis built directly from a single worker's answer,
    /// used when coordination short-circuits
    pub fn minimal(summary: impl Into<String>) -> Self {
        Self {
            root_causes: vec![],
            correlations: vec![],
            severity: Severity::Low,
            summary: summary.into(),
        }
    }
}

/// One actionable recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Priority order
    pub priority: Priority,
    /// What to do
    pub action: String,
    /// Why this helps
    pub reason: String,
    /// What improves if applied
    pub expected_impact: Option<String>,
}

/// Combined output of the recommendation coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct Coordination {
    /// Root-cause analysis
    pub diagnosis: Diagnosis,
    /// Prioritized recommendations
    pub recommendations: Vec<Recommendation>,
    /// Confidence in the recommendations, in [0, 1]
    pub confidence: f64,
}

/// Outcome of the early-exit decision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitDecision {
    /// Whether to skip validation and respond now
    pub exit: bool,
    /// Why the exit was taken
    pub reason: Option<String>,
    /// Response text to use instead of the diagnosis summary
    pub final_response: Option<String>,
    /// Confidence override for the exit response
    pub confidence: Option<f64>,
}

/// Outcome of recommendation validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    /// Recommendations that survived the sanity check (subset of the input)
    pub validated: Vec<Recommendation>,
    /// Warnings about dropped or questionable recommendations
    pub warnings: Vec<String>,
}

/// Consistency findings summarized for the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewContext {
    /// Whether results were consistent at the end of review
    pub consistent: bool,
    /// Remaining disagreements
    pub mismatches: Vec<Mismatch>,
    /// How many requery rounds were spent
    pub requery_count: u32,
    /// Parameters the orchestrator requested
    pub expected: NormalizedParams,
    /// Time period each worker evidently used
    pub actual_periods: BTreeMap<String, String>,
    /// Whether the query compares multiple workers/data sources
    pub comparison_mode: bool,
}
