//! Phase handlers
//!
//! Each handler executes one phase against the current run state and returns
//! a `StateDelta`. No failure escapes a handler: worker errors land in the
//! error map, oracle failures either degrade the run (strategy, gate,
//! coordination, validation) or fail open (consistency review).

use crate::engine::fanout::invoke_workers;
use crate::engine::progress::{ProgressSink, ProgressStatus};
use crate::engine::response;
use crate::engine::runner::Engine;
use crate::engine::state::{EarlyExit, ReviewOutcome, RunState, StateDelta};
use crate::oracle::types::{Diagnosis, NormalizedParams, ReviewContext, StrategyDecision};
use crate::worker::WorkerInput;
use serde_json::json;
use std::time::Duration;

/// Confidence reported to the gate for a resolved strategy
const ROUTING_CONFIDENCE: f64 = 0.9;

/// Default confidence of an early-exit response
const EARLY_EXIT_CONFIDENCE: f64 = 0.8;

impl Engine {
    pub(crate) async fn handle_analysis(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        progress.emit(
            "analysis",
            ProgressStatus::Running,
            json!({ "message": "Analyzing query and creating coordinated strategy" }),
        );

        let descriptors = self.registry.descriptors();
        match self
            .oracle
            .resolve_strategy(&state.query, &state.history, &descriptors)
            .await
        {
            Ok(StrategyDecision::Proceed(strategy)) => {
                tracing::info!(
                    workers = ?strategy.selected_workers,
                    time_period = %strategy.params.time_period,
                    comparison_mode = strategy.comparison_mode,
                    "Strategy resolved"
                );
                let reasoning = format!(
                    "Analysis: selected {} worker(s) [{}] with {}",
                    strategy.selected_workers.len(),
                    strategy
                        .selected_workers
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", "),
                    strategy.params.describe()
                );
                StateDelta {
                    strategy: Some(strategy),
                    reasoning: vec![reasoning],
                    ..StateDelta::default()
                }
            }
            Ok(StrategyDecision::Clarify { question }) => {
                tracing::info!(query = %state.query, "Query unclear, requesting clarification");
                StateDelta {
                    clarification: Some(question),
                    reasoning: vec![
                        "Analysis: query unclear, requesting clarification".to_string()
                    ],
                    ..StateDelta::default()
                }
            }
            Err(error) => {
                tracing::error!(error = %error, "Strategy resolution failed");
                StateDelta::degraded(
                    format!("strategy resolution failed: {}", error),
                    format!("Analysis failed: {}", error),
                )
            }
        }
    }

    pub(crate) async fn handle_gate(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        let Some(strategy) = &state.strategy else {
            return StateDelta::degraded(
                "gate reached without a resolved strategy",
                "Gate: no strategy available",
            );
        };

        progress.emit(
            "gate",
            ProgressStatus::Running,
            json!({ "message": "Validating request" }),
        );

        match self
            .oracle
            .validate_gate(
                &state.query,
                &strategy.selected_workers,
                ROUTING_CONFIDENCE,
                &state.user_id,
            )
            .await
        {
            Ok(mut decision) => {
                decision
                    .approved_workers
                    .retain(|worker| strategy.selected_workers.contains(worker));

                let reasoning = if decision.valid {
                    format!(
                        "Gate: approved {} worker(s), {} warning(s)",
                        decision.approved_workers.len(),
                        decision.warnings.len()
                    )
                } else {
                    format!(
                        "Gate: blocked - {}",
                        decision.reason.as_deref().unwrap_or("no reason given")
                    )
                };
                tracing::info!(
                    valid = decision.valid,
                    approved = decision.approved_workers.len(),
                    "Gate decision"
                );
                StateDelta {
                    gate: Some(decision),
                    reasoning: vec![reasoning],
                    ..StateDelta::default()
                }
            }
            Err(error) => {
                tracing::error!(error = %error, "Gate validation failed");
                StateDelta::degraded(
                    format!("gate validation failed: {}", error),
                    format!("Gate failed: {}", error),
                )
            }
        }
    }

    pub(crate) async fn handle_fanout(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        let approved = state.approved_workers();

        progress.emit(
            "invoke_workers",
            ProgressStatus::Running,
            json!({
                "message": format!("Running {} worker(s) in parallel", approved.len()),
                "workers": approved,
            }),
        );

        let outcome = invoke_workers(
            &self.registry,
            &approved,
            |name| self.compose_worker_input(state, name, false),
            Duration::from_secs(self.config.worker_timeout_secs),
            progress,
        )
        .await;

        let reasoning = format!(
            "Invoked {} worker(s) successfully, {} failed",
            outcome.results.len(),
            outcome.errors.len()
        );
        StateDelta {
            worker_results: Some(outcome.results),
            worker_errors: Some(outcome.errors),
            reasoning: vec![reasoning],
            ..StateDelta::default()
        }
    }

    pub(crate) async fn handle_review(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        progress.emit(
            "review",
            ProgressStatus::Running,
            json!({ "message": "Reviewing worker results for consistency" }),
        );

        let max_requeries = self.config.max_requeries;
        if state.requery_count >= max_requeries {
            tracing::warn!(
                requery_count = state.requery_count,
                "Requery budget exhausted, proceeding with current results"
            );
            return StateDelta {
                review: Some(ReviewOutcome {
                    consistent: false,
                    requery_needed: false,
                    max_retries_reached: true,
                    ..ReviewOutcome::default()
                }),
                validation_warnings: vec![format!(
                    "Worker results remained inconsistent after {} requery round(s)",
                    state.requery_count
                )],
                reasoning: vec![
                    "Review: max requeries reached, proceeding with current results".to_string(),
                ],
                ..StateDelta::default()
            };
        }

        let expected = state
            .strategy
            .as_ref()
            .map(|s| s.params.clone())
            .unwrap_or_default();

        match self
            .oracle
            .review_consistency(&state.worker_results, &expected)
            .await
        {
            Ok(findings) => {
                let requery_needed = !findings.consistent && state.requery_count < max_requeries;
                let reasoning = if findings.consistent {
                    "Review: results consistent".to_string()
                } else {
                    format!("Review: {} mismatch(es) detected", findings.mismatches.len())
                };
                tracing::info!(
                    consistent = findings.consistent,
                    mismatches = findings.mismatches.len(),
                    requery_needed = requery_needed,
                    "Review complete"
                );
                StateDelta {
                    review: Some(ReviewOutcome {
                        consistent: findings.consistent,
                        requery_needed,
                        max_retries_reached: false,
                        mismatches: findings.mismatches,
                        worker_time_periods: findings.worker_time_periods,
                    }),
                    reasoning: vec![reasoning],
                    ..StateDelta::default()
                }
            }
            Err(error) => {
                // Fail open: an unreviewable result set proceeds as consistent
                tracing::warn!(error = %error, "Consistency review failed, assuming consistent");
                StateDelta {
                    review: Some(ReviewOutcome {
                        consistent: true,
                        requery_needed: false,
                        max_retries_reached: false,
                        ..ReviewOutcome::default()
                    }),
                    reasoning: vec![format!("Review failed: {}, proceeding", error)],
                    ..StateDelta::default()
                }
            }
        }
    }

    pub(crate) async fn handle_requery(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        let approved = state.approved_workers();
        let round = state.requery_count + 1;

        progress.emit(
            "requery",
            ProgressStatus::Running,
            json!({
                "message": format!(
                    "Re-querying {} worker(s) with normalized parameters (round {})",
                    approved.len(),
                    round
                ),
            }),
        );

        let outcome = invoke_workers(
            &self.registry,
            &approved,
            |name| self.compose_worker_input(state, name, true),
            Duration::from_secs(self.config.worker_timeout_secs),
            progress,
        )
        .await;

        let reasoning = format!(
            "Requery round {}: re-invoked {} worker(s), {} failed",
            round,
            outcome.results.len(),
            outcome.errors.len()
        );
        StateDelta {
            worker_results: Some(outcome.results),
            worker_errors: Some(outcome.errors),
            requery_count: Some(round),
            reasoning: vec![reasoning],
            ..StateDelta::default()
        }
    }

    pub(crate) async fn handle_coordination(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        progress.emit(
            "coordination",
            ProgressStatus::Running,
            json!({ "message": "Coordinating diagnosis and recommendations" }),
        );

        let approved = state.approved_workers();

        if approved.len() == 1 {
            let skip_reason = if self.classifier.is_follow_up(&state.query) {
                Some("follow-up query")
            } else if self.classifier.is_informational(&state.query) {
                Some("single-worker informational query")
            } else {
                None
            };

            if let Some(skip_reason) = skip_reason {
                tracing::info!(reason = skip_reason, "Skipping coordination");
                let summary = state
                    .worker_results
                    .get(&approved[0])
                    .map(|output| output.response.clone())
                    .unwrap_or_else(|| "Query processed successfully".to_string());

                return StateDelta {
                    diagnosis: Some(Diagnosis::minimal(summary)),
                    recommendation_confidence: Some(0.0),
                    early_exit: Some(EarlyExit {
                        reason: format!("{} - no action needed", skip_reason),
                        response: None,
                        confidence: EARLY_EXIT_CONFIDENCE,
                    }),
                    reasoning: vec![format!("Coordination skipped: {}", skip_reason)],
                    ..StateDelta::default()
                };
            }
        }

        if state
            .review
            .as_ref()
            .is_some_and(|review| review.max_retries_reached)
        {
            tracing::info!("Coordinating with unresolved parameter inconsistencies");
        }

        let review_context = self.build_review_context(state);
        let gate_warnings = state
            .gate
            .as_ref()
            .map(|gate| gate.warnings.clone())
            .unwrap_or_default();

        let coordination = match self
            .oracle
            .coordinate(
                &state.worker_results,
                &state.query,
                &state.history,
                &gate_warnings,
                &review_context,
            )
            .await
        {
            Ok(coordination) => coordination,
            Err(error) => {
                tracing::error!(error = %error, "Coordination failed");
                return StateDelta::degraded(
                    format!("coordination failed: {}", error),
                    format!("Coordination failed: {}", error),
                );
            }
        };

        let mut delta = StateDelta {
            diagnosis: Some(coordination.diagnosis.clone()),
            recommendations: coordination.recommendations.clone(),
            recommendation_confidence: Some(coordination.confidence),
            reasoning: vec![format!(
                "Coordination: {} root cause(s), {} recommendation(s)",
                coordination.diagnosis.root_causes.len(),
                coordination.recommendations.len()
            )],
            ..StateDelta::default()
        };

        if coordination.recommendations.is_empty() {
            delta.early_exit = Some(EarlyExit {
                reason: "no actionable recommendations".to_string(),
                response: None,
                confidence: EARLY_EXIT_CONFIDENCE,
            });
            delta
                .reasoning
                .push("Early exit: no recommendations generated".to_string());
            return delta;
        }

        match self
            .oracle
            .decide_early_exit(&coordination.diagnosis, &state.worker_results, &state.query)
            .await
        {
            Ok(decision) if decision.exit => {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "early exit".to_string());
                tracing::info!(reason = %reason, "Early exit triggered");
                delta.reasoning.push(format!("Early exit: {}", reason));
                delta.early_exit = Some(EarlyExit {
                    reason,
                    response: decision.final_response,
                    confidence: decision.confidence.unwrap_or(EARLY_EXIT_CONFIDENCE),
                });
            }
            Ok(_) => {
                delta
                    .reasoning
                    .push("Early exit: continuing to validation".to_string());
            }
            Err(error) => {
                tracing::warn!(error = %error, "Early-exit decision failed, continuing");
                delta.reasoning.push(format!(
                    "Early-exit decision failed: {}, continuing to validation",
                    error
                ));
            }
        }

        delta
    }

    pub(crate) async fn handle_validation(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        progress.emit(
            "validation",
            ProgressStatus::Running,
            json!({
                "message": format!("Validating {} recommendation(s)", state.recommendations.len())
            }),
        );

        let diagnosis = state
            .diagnosis
            .clone()
            .unwrap_or_else(|| Diagnosis::minimal(""));

        match self
            .oracle
            .validate_recommendations(&state.recommendations, &diagnosis, &state.worker_results)
            .await
        {
            Ok(outcome) => {
                let validated: Vec<_> = outcome
                    .validated
                    .into_iter()
                    .filter(|rec| state.recommendations.contains(rec))
                    .collect();
                let reasoning = format!(
                    "Validation: {} recommendation(s) validated, {} warning(s)",
                    validated.len(),
                    outcome.warnings.len()
                );
                StateDelta {
                    validated_recommendations: validated,
                    validation_warnings: outcome.warnings,
                    reasoning: vec![reasoning],
                    ..StateDelta::default()
                }
            }
            Err(error) => {
                tracing::error!(error = %error, "Recommendation validation failed");
                StateDelta::degraded(
                    format!("recommendation validation failed: {}", error),
                    format!("Validation failed: {}", error),
                )
            }
        }
    }

    pub(crate) async fn handle_respond(
        &self,
        state: &RunState,
        progress: &ProgressSink,
    ) -> StateDelta {
        progress.emit(
            "respond",
            ProgressStatus::Running,
            json!({ "message": "Formatting response" }),
        );

        if let Some(exit) = &state.early_exit {
            tracing::debug!(reason = %exit.reason, "Responding after early exit");
        }

        let (text, confidence) =
            response::assemble(state, &self.config, self.classifier.as_ref());

        tracing::info!(
            response_len = text.len(),
            confidence = confidence,
            "Generated final response"
        );
        StateDelta {
            final_response: Some(text),
            confidence: Some(confidence),
            reasoning: vec!["Generated final response".to_string()],
            ..StateDelta::default()
        }
    }

    /// Build the instruction and context handed to one worker invocation
    pub(crate) fn compose_worker_input(
        &self,
        state: &RunState,
        worker_name: &str,
        requery: bool,
    ) -> WorkerInput {
        let strategy = state.strategy.as_ref();
        let params = strategy
            .map(|s| s.params.clone())
            .unwrap_or_else(NormalizedParams::default);
        let intent = strategy.map(|s| s.intent.as_str()).unwrap_or("");
        let selected: Vec<String> = strategy
            .map(|s| s.selected_workers.iter().cloned().collect())
            .unwrap_or_default();
        let comparison_mode = strategy.map(|s| s.comparison_mode).unwrap_or(false);

        let mut message = String::new();
        message.push_str("COORDINATED ANALYSIS INSTRUCTION:\n\n");
        if !intent.is_empty() {
            message.push_str(&format!("Intent: {}\n", intent));
        }
        message.push_str(&format!("Use exactly these parameters: {}.\n", params.describe()));
        message.push_str("Data is only available up to yesterday; never include today.\n");

        if selected.len() > 1 {
            let others: Vec<&String> =
                selected.iter().filter(|name| *name != worker_name).collect();
            message.push_str(&format!(
                "You are one of {} workers in this analysis; {} are analyzing other aspects \
                 with the same parameters.\n",
                selected.len(),
                others
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            if comparison_mode {
                message.push_str(
                    "This is a comparison analysis - your results will be compared with the \
                     other workers' findings.\n",
                );
            }
        }

        message.push_str(&format!("\nUser query:\n{}", state.query));

        if requery {
            message.push_str(&format!(
                "\n\nIMPORTANT: your previous answer appeared to use different parameters. \
                 Redo the analysis using exactly {}.",
                params.describe()
            ));
        }

        let mut context = std::collections::HashMap::new();
        context.insert("intent".to_string(), json!(intent));
        context.insert("time_period".to_string(), json!(params.time_period));
        context.insert("start_date".to_string(), json!(params.start_date));
        context.insert("end_date".to_string(), json!(params.end_date));
        context.insert("comparison_mode".to_string(), json!(comparison_mode));
        context.insert("selected_workers".to_string(), json!(selected));
        context.insert("requery".to_string(), json!(requery));

        WorkerInput {
            message,
            session_id: state.session_id,
            user_id: state.user_id.clone(),
            context,
        }
    }

    fn build_review_context(&self, state: &RunState) -> ReviewContext {
        let review = state.review.clone().unwrap_or_default();
        ReviewContext {
            consistent: review.consistent,
            mismatches: review.mismatches,
            requery_count: state.requery_count,
            expected: state
                .strategy
                .as_ref()
                .map(|s| s.params.clone())
                .unwrap_or_default(),
            actual_periods: review.worker_time_periods,
            comparison_mode: state
                .strategy
                .as_ref()
                .map(|s| s.comparison_mode)
                .unwrap_or(false),
        }
    }
}
