//! LLM-backed oracle adapter
//!
//! Builds JSON-mode prompts for each decision, parses the structured JSON the
//! model returns, and converts it into the typed decisions the engine
//! consumes. All format handling is confined to this adapter - the engine
//! never special-cases oracle output.

use crate::llm::GenerateClient;
use crate::oracle::types::{
    Coordination, Diagnosis, ExitDecision, GateDecision, Mismatch, NormalizedParams, Priority,
    Recommendation, ReviewContext, ReviewFindings, Severity, Strategy, StrategyDecision,
    ValidationOutcome,
};
use crate::oracle::{Oracle, OracleError};
use crate::session::Turn;
use crate::worker::{WorkerDescriptor, WorkerOutput};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Maximum conversation turns included in oracle prompts
const HISTORY_WINDOW: usize = 6;

/// Decision oracle backed by the generation API in JSON mode
pub struct LlmOracle {
    client: Arc<GenerateClient>,
}

impl LlmOracle {
    /// Create a new oracle over a shared generation client
    pub fn new(client: Arc<GenerateClient>) -> Self {
        Self { client }
    }

    async fn decide<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, OracleError> {
        let text = self.client.generate(prompt, true).await?;
        serde_json::from_str(&text)
            .map_err(|e| OracleError::Malformed(format!("{} - raw decision: {}", e, text)))
    }
}

fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn history_block(history: &[Turn]) -> String {
    if history.is_empty() {
        return "None".to_string();
    }
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..]
        .iter()
        .map(|turn| {
            let role = match turn.role {
                crate::session::Role::User => "User",
                crate::session::Role::Assistant => "Assistant",
            };
            let content = if turn.content.len() > 300 {
                let end = turn
                    .content
                    .char_indices()
                    .nth(300)
                    .map(|(index, _)| index)
                    .unwrap_or(turn.content.len());
                format!("{}...", &turn.content[..end])
            } else {
                turn.content.clone()
            };
            format!("{}: {}", role, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn results_block(results: &BTreeMap<String, WorkerOutput>) -> String {
    results
        .iter()
        .map(|(name, output)| format!("{}:\n{}\n", name, output.response))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a symbolic relative time period into a concrete date range ending
/// yesterday. Data is never available for the current day, so every range
/// excludes `today`.
pub fn resolve_relative_dates(params: &mut NormalizedParams, today: NaiveDate) {
    if params.start_date.is_some() && params.end_date.is_some() {
        return;
    }
    let yesterday = today - Duration::days(1);
    match params.time_period.as_str() {
        "last_7_days" => {
            params.end_date = Some(yesterday);
            params.start_date = Some(yesterday - Duration::days(7));
        }
        "last_30_days" => {
            params.end_date = Some(yesterday);
            params.start_date = Some(yesterday - Duration::days(30));
        }
        "current_month" => {
            params.start_date = NaiveDate::from_ymd_opt(today.year(), today.month(), 1);
            params.end_date = Some(yesterday);
        }
        _ => {}
    }
}

#[derive(Deserialize)]
struct StrategyWire {
    #[serde(default)]
    selected_workers: Vec<String>,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    time_period: String,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
    #[serde(default)]
    comparison_mode: bool,
    #[serde(default)]
    clarification: Option<String>,
}

#[derive(Deserialize)]
struct GateWire {
    #[serde(default)]
    approved_workers: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ReviewWorkerWire {
    worker: String,
    #[serde(default)]
    time_period: String,
    matches: bool,
}

#[derive(Deserialize)]
struct ReviewWire {
    #[serde(default)]
    workers: Vec<ReviewWorkerWire>,
}

#[derive(Deserialize)]
struct RecommendationWire {
    #[serde(default = "default_priority")]
    priority: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    expected_impact: Option<String>,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Deserialize)]
struct CoordinationWire {
    #[serde(default)]
    root_causes: Vec<String>,
    #[serde(default)]
    correlations: Vec<String>,
    #[serde(default = "default_priority")]
    severity: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    recommendations: Vec<RecommendationWire>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

#[derive(Deserialize)]
struct ExitWire {
    exit: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    final_response: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Deserialize)]
struct ValidationWire {
    #[serde(default)]
    approved: Vec<usize>,
    #[serde(default)]
    warnings: Vec<String>,
}

fn strategy_prompt(query: &str, history: &[Turn], available: &[WorkerDescriptor]) -> String {
    let workers = available
        .iter()
        .map(|w| format!("- {}: {}", w.name, w.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You coordinate a team of analysis workers. Understand the user's query, select the workers that should handle it, and normalize its time parameters so every worker uses the same range.

CONVERSATION HISTORY:
{history}

Available workers:
{workers}

User query: "{query}"

Rules:
- Data is only available up to yesterday. Never include the current date in a range.
- "recently" means last_7_days. "this month" means current_month. Explicit dates mean time_period "custom" with start_date and end_date set.
- Select one or more workers whenever the query is understandable, even partially. Only leave selected_workers empty when the query is so vague you cannot determine intent at all (e.g. "hello", "help").

Respond with JSON only:
{{
  "selected_workers": ["worker_name"],
  "intent": "what the user wants to know",
  "time_period": "last_7_days|last_30_days|current_month|custom|",
  "start_date": "YYYY-MM-DD or null",
  "end_date": "YYYY-MM-DD or null",
  "comparison_mode": false,
  "clarification": "a question for the user, ONLY when selected_workers is empty"
}}"#,
        history = history_block(history),
        workers = workers,
        query = query,
    )
}

fn gate_prompt(query: &str, selected: &BTreeSet<String>, confidence: f64, user_id: &str) -> String {
    let selected: Vec<&str> = selected.iter().map(String::as_str).collect();
    format!(
        r#"You are a business-rule gate for an analysis request. Decide whether the request may proceed and which of the proposed workers are approved.

User: {user_id}
Routing confidence: {confidence:.2}
Proposed workers: {selected:?}
Query: "{query}"

Approve every proposed worker unless a rule forbids it (abusive request, disallowed worker combination, obvious misuse). Add advisory warnings for anything downstream analysis should know.

Respond with JSON only:
{{
  "approved_workers": ["worker_name"],
  "warnings": [],
  "valid": true,
  "reason": "required when valid is false"
}}"#,
    )
}

fn review_prompt(results: &BTreeMap<String, WorkerOutput>, expected: &NormalizedParams) -> String {
    format!(
        r#"You review analysis worker responses for parameter consistency.

Expected parameters:
- Time period: {period}
- Start date: {start}
- End date: {end}

Worker responses:
{results}

For each worker, extract the time period its response evidently used and state whether it matches the expected parameters.

Respond with JSON only:
{{
  "workers": [
    {{"worker": "name", "time_period": "what it used", "matches": true}}
  ]
}}"#,
        period = expected.time_period,
        start = expected
            .start_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unspecified".to_string()),
        end = expected
            .end_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unspecified".to_string()),
        results = results_block(results),
    )
}

fn coordination_prompt(
    results: &BTreeMap<String, WorkerOutput>,
    query: &str,
    history: &[Turn],
    gate_warnings: &[String],
    review: &ReviewContext,
) -> String {
    let warnings = if gate_warnings.is_empty() {
        "None".to_string()
    } else {
        gate_warnings
            .iter()
            .map(|w| format!("- {}", w))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let review_block = serde_json::to_string_pretty(review).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an analysis expert. Combine the worker results below into a diagnosis and prioritized recommendations.

User query: "{query}"

CONVERSATION CONTEXT:
{history}

GATE WARNINGS:
{warnings}

CONSISTENCY REVIEW FINDINGS:
{review_block}

Worker results:
{results}

Identify root causes, correlations between worker findings, overall severity, and 3-4 actionable recommendations that address the root causes.

Respond with JSON only:
{{
  "root_causes": [],
  "correlations": [],
  "severity": "critical|high|medium|low",
  "summary": "2-3 sentence diagnosis summary",
  "recommendations": [
    {{"priority": "high|medium|low", "action": "...", "reason": "...", "expected_impact": "..."}}
  ],
  "confidence": 0.8
}}"#,
        history = history_block(history),
        results = results_block(results),
    )
}

fn exit_prompt(
    diagnosis: &Diagnosis,
    results: &BTreeMap<String, WorkerOutput>,
    query: &str,
) -> String {
    format!(
        r#"Decide whether this analysis run can finish now, skipping recommendation validation.

Query: "{query}"
Diagnosis severity: {severity}
Diagnosis summary: {summary}

Worker results:
{results}

Exit when the diagnosis already answers the query and no recommendation needs checking. Otherwise continue.

Respond with JSON only:
{{
  "exit": false,
  "reason": "why",
  "final_response": "response text when exiting, or null",
  "confidence": 0.8
}}"#,
        severity = diagnosis.severity,
        summary = diagnosis.summary,
        results = results_block(results),
    )
}

fn validation_prompt(
    recommendations: &[Recommendation],
    diagnosis: &Diagnosis,
    results: &BTreeMap<String, WorkerOutput>,
) -> String {
    let numbered = recommendations
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. [{}] {} - {}", i, r.priority, r.action, r.reason))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Sanity-check these recommendations against the diagnosis and the raw worker data. Drop any recommendation the data does not support.

Diagnosis: [{severity}] {summary}

Recommendations:
{numbered}

Worker results:
{results}

Respond with JSON only:
{{
  "approved": [0, 1],
  "warnings": ["note about anything dropped or questionable"]
}}"#,
        severity = diagnosis.severity,
        summary = diagnosis.summary,
        results = results_block(results),
    )
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn resolve_strategy(
        &self,
        query: &str,
        history: &[Turn],
        available: &[WorkerDescriptor],
    ) -> Result<StrategyDecision, OracleError> {
        let prompt = strategy_prompt(query, history, available);
        let wire: StrategyWire = self.decide(&prompt).await?;

        let known: BTreeSet<&str> = available.iter().map(|w| w.name.as_str()).collect();
        let selected: BTreeSet<String> = wire
            .selected_workers
            .iter()
            .filter(|name| {
                let ok = known.contains(name.as_str());
                if !ok {
                    tracing::warn!(worker = %name, "Strategy selected an unknown worker, dropping");
                }
                ok
            })
            .cloned()
            .collect();

        if selected.is_empty() {
            let question = wire.clarification.filter(|q| !q.is_empty()).unwrap_or_else(|| {
                "Could you clarify what you would like analyzed? For example: \
                 'Show me performance for last week' or 'What is the budget status this month?'"
                    .to_string()
            });
            return Ok(StrategyDecision::Clarify { question });
        }

        // A non-empty selection is authoritative; an accompanying
        // clarification is informational only.
        if let Some(aside) = wire.clarification.filter(|q| !q.is_empty()) {
            tracing::info!(aside = %aside, "Ignoring clarification aside, workers were selected");
        }

        let mut params = NormalizedParams {
            time_period: wire.time_period,
            start_date: wire.start_date,
            end_date: wire.end_date,
        };
        resolve_relative_dates(&mut params, chrono::Local::now().date_naive());

        Ok(StrategyDecision::Proceed(Strategy {
            selected_workers: selected,
            intent: wire.intent,
            params,
            comparison_mode: wire.comparison_mode,
        }))
    }

    async fn validate_gate(
        &self,
        query: &str,
        selected: &BTreeSet<String>,
        confidence: f64,
        user_id: &str,
    ) -> Result<GateDecision, OracleError> {
        let prompt = gate_prompt(query, selected, confidence, user_id);
        let wire: GateWire = self.decide(&prompt).await?;

        let approved: BTreeSet<String> = wire
            .approved_workers
            .into_iter()
            .filter(|name| selected.contains(name))
            .collect();

        Ok(GateDecision {
            approved_workers: approved,
            warnings: wire.warnings,
            valid: wire.valid,
            reason: wire.reason,
        })
    }

    async fn review_consistency(
        &self,
        results: &BTreeMap<String, WorkerOutput>,
        expected: &NormalizedParams,
    ) -> Result<ReviewFindings, OracleError> {
        if results.is_empty() {
            return Ok(ReviewFindings {
                consistent: true,
                ..ReviewFindings::default()
            });
        }

        let prompt = review_prompt(results, expected);
        let wire: ReviewWire = self.decide(&prompt).await?;

        let mut findings = ReviewFindings {
            consistent: true,
            ..ReviewFindings::default()
        };
        for worker in wire.workers {
            findings
                .worker_time_periods
                .insert(worker.worker.clone(), worker.time_period.clone());
            if !worker.matches {
                findings.consistent = false;
                findings.mismatches.push(Mismatch {
                    worker: worker.worker,
                    expected: expected.describe(),
                    actual: worker.time_period,
                });
            }
        }
        Ok(findings)
    }

    async fn coordinate(
        &self,
        results: &BTreeMap<String, WorkerOutput>,
        query: &str,
        history: &[Turn],
        gate_warnings: &[String],
        review: &ReviewContext,
    ) -> Result<Coordination, OracleError> {
        let prompt = coordination_prompt(results, query, history, gate_warnings, review);
        let wire: CoordinationWire = self.decide(&prompt).await?;

        let recommendations = wire
            .recommendations
            .into_iter()
            .filter(|r| !r.action.is_empty())
            .map(|r| Recommendation {
                priority: Priority::parse_or_medium(&r.priority),
                action: r.action,
                reason: r.reason,
                expected_impact: r.expected_impact.filter(|s| !s.is_empty()),
            })
            .collect();

        Ok(Coordination {
            diagnosis: Diagnosis {
                root_causes: wire.root_causes,
                correlations: wire.correlations,
                severity: Severity::parse_or_medium(&wire.severity),
                summary: if wire.summary.is_empty() {
                    "No clear diagnosis available".to_string()
                } else {
                    wire.summary
                },
            },
            recommendations,
            confidence: clamp_confidence(wire.confidence),
        })
    }

    async fn decide_early_exit(
        &self,
        diagnosis: &Diagnosis,
        results: &BTreeMap<String, WorkerOutput>,
        query: &str,
    ) -> Result<ExitDecision, OracleError> {
        let prompt = exit_prompt(diagnosis, results, query);
        let wire: ExitWire = self.decide(&prompt).await?;

        Ok(ExitDecision {
            exit: wire.exit,
            reason: wire.reason,
            final_response: wire.final_response.filter(|s| !s.is_empty()),
            confidence: wire.confidence.map(clamp_confidence),
        })
    }

    async fn validate_recommendations(
        &self,
        recommendations: &[Recommendation],
        diagnosis: &Diagnosis,
        results: &BTreeMap<String, WorkerOutput>,
    ) -> Result<ValidationOutcome, OracleError> {
        let prompt = validation_prompt(recommendations, diagnosis, results);
        let wire: ValidationWire = self.decide(&prompt).await?;

        let validated = wire
            .approved
            .into_iter()
            .filter_map(|index| recommendations.get(index).cloned())
            .collect();

        Ok(ValidationOutcome {
            validated,
            warnings: wire.warnings,
        })
    }
}
