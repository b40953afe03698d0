//! Engine loop
//!
//! Walks the workflow graph for one run: execute the current phase's handler,
//! merge the returned delta, evaluate the outgoing edge, stop at the terminal
//! phase. The whole walk is wrapped in a run-level timeout so the engine
//! always produces a response object for an accepted request.

use crate::config::EngineConfig;
use crate::engine::classify::QueryClassifier;
use crate::engine::graph::{Phase, WorkflowGraph};
use crate::engine::progress::{ProgressSink, ProgressStatus};
use crate::engine::state::RunState;
use crate::oracle::types::{Recommendation, Severity};
use crate::oracle::Oracle;
use crate::session::Turn;
use crate::worker::WorkerRegistry;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;

/// Inputs for one orchestration run
#[derive(Debug, Clone)]
pub struct RunInput {
    /// The user's query
    pub query: String,
    /// Conversation session, if any
    pub session_id: Option<Uuid>,
    /// Requesting user
    pub user_id: String,
    /// Recent conversation turns, oldest first
    pub history: Vec<Turn>,
}

/// Result of one orchestration run
///
/// Always produced; total failure is expressed as response text plus zero
/// confidence, never as an error.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final user-facing response text
    pub response: String,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    /// Workers that produced a result
    pub workers_invoked: Vec<String>,
    /// Workers that failed, with their error messages
    pub worker_errors: BTreeMap<String, String>,
    /// Diagnosed severity, when a diagnosis was produced
    pub severity: Option<Severity>,
    /// Validated recommendations
    pub recommendations: Vec<Recommendation>,
    /// Requery rounds spent
    pub requery_count: u32,
    /// Reasoning trace accumulated across phases
    pub reasoning: Vec<String>,
    /// Wall-clock duration of the run in milliseconds
    pub execution_time_ms: u128,
}

impl RunOutcome {
    fn from_state(state: RunState, elapsed: Duration) -> Self {
        let response = state.final_response.unwrap_or_else(|| {
            "I was unable to complete the analysis of your request.".to_string()
        });
        Self {
            response,
            confidence: state.confidence,
            workers_invoked: state.worker_results.keys().cloned().collect(),
            worker_errors: state.worker_errors,
            severity: state.diagnosis.as_ref().map(|d| d.severity),
            recommendations: state.validated_recommendations,
            requery_count: state.requery_count,
            reasoning: state.reasoning_log,
            execution_time_ms: elapsed.as_millis(),
        }
    }

    fn timed_out(timeout_secs: u64, elapsed: Duration) -> Self {
        Self {
            response: format!(
                "The analysis timed out after {} seconds. Please try again.",
                timeout_secs
            ),
            confidence: 0.0,
            workers_invoked: vec![],
            worker_errors: BTreeMap::new(),
            severity: None,
            recommendations: vec![],
            requery_count: 0,
            reasoning: vec!["Run timed out".to_string()],
            execution_time_ms: elapsed.as_millis(),
        }
    }
}

/// The workflow graph engine
///
/// Holds the immutable per-process collaborators (worker registry, oracle,
/// classifier, configuration, graph topology) and executes independent runs
/// against them. No state is shared between concurrent runs.
pub struct Engine {
    pub(crate) registry: Arc<WorkerRegistry>,
    pub(crate) oracle: Arc<dyn Oracle>,
    pub(crate) classifier: Arc<dyn QueryClassifier>,
    pub(crate) config: EngineConfig,
    graph: WorkflowGraph,
}

impl Engine {
    /// Create an engine over the given collaborators
    pub fn new(
        registry: Arc<WorkerRegistry>,
        oracle: Arc<dyn Oracle>,
        classifier: Arc<dyn QueryClassifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            oracle,
            classifier,
            config,
            graph: WorkflowGraph::standard(),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one run without progress events
    pub async fn execute(&self, input: RunInput) -> RunOutcome {
        self.execute_with_progress(input, ProgressSink::disabled())
            .await
    }

    /// Execute one run, emitting progress events to the given sink
    pub async fn execute_with_progress(
        &self,
        input: RunInput,
        progress: ProgressSink,
    ) -> RunOutcome {
        let start = Instant::now();
        let run_timeout_secs = self.config.run_timeout_secs;

        tracing::info!(
            query = %preview(&input.query),
            user_id = %input.user_id,
            "Starting orchestration run"
        );

        let outcome = match timeout(
            Duration::from_secs(run_timeout_secs),
            self.run_graph(input, &progress),
        )
        .await
        {
            Ok(state) => RunOutcome::from_state(state, start.elapsed()),
            Err(_) => {
                tracing::error!(timeout_secs = run_timeout_secs, "Run timed out");
                RunOutcome::timed_out(run_timeout_secs, start.elapsed())
            }
        };

        tracing::info!(
            execution_time_ms = outcome.execution_time_ms as u64,
            confidence = outcome.confidence,
            workers_invoked = outcome.workers_invoked.len(),
            "Orchestration run completed"
        );

        outcome
    }

    async fn run_graph(&self, input: RunInput, progress: &ProgressSink) -> RunState {
        let mut state = RunState::new(input.query, input.session_id, input.user_id, input.history);
        let mut phase = self.graph.entry();
        let mut transitions = 0u32;

        loop {
            tracing::debug!(phase = phase.name(), "Executing phase");
            progress.emit(phase.name(), ProgressStatus::Started, json!({}));

            let delta = self.run_phase(phase, &state, progress).await;
            state.apply(delta);

            progress.emit(phase.name(), ProgressStatus::Completed, json!({}));

            transitions += 1;
            if transitions >= self.config.max_transitions {
                tracing::error!(
                    transitions = transitions,
                    "Phase transition guard tripped, ending run"
                );
                break;
            }

            match self.graph.next(phase, &state) {
                Some(next) => phase = next,
                None => break,
            }
        }

        state
    }

    async fn run_phase(
        &self,
        phase: Phase,
        state: &RunState,
        progress: &ProgressSink,
    ) -> crate::engine::state::StateDelta {
        match phase {
            Phase::Analysis => self.handle_analysis(state, progress).await,
            Phase::Gate => self.handle_gate(state, progress).await,
            Phase::FanOut => self.handle_fanout(state, progress).await,
            Phase::Review => self.handle_review(state, progress).await,
            Phase::Requery => self.handle_requery(state, progress).await,
            Phase::Coordination => self.handle_coordination(state, progress).await,
            Phase::Validation => self.handle_validation(state, progress).await,
            Phase::Respond => self.handle_respond(state, progress).await,
        }
    }
}

pub(crate) fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(50)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classify::KeywordClassifier;
    use crate::oracle::types::{
        Coordination, Diagnosis, ExitDecision, GateDecision, Mismatch, NormalizedParams,
        Priority, Recommendation, ReviewFindings, Severity, Strategy, StrategyDecision,
        ValidationOutcome,
    };
    use crate::oracle::OracleError;
    use crate::worker::{WorkerDescriptor, WorkerError, WorkerInput, WorkerOutput};
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Behavior {
        Succeed(&'static str),
        Fail(&'static str),
    }

    struct MockWorker {
        name: &'static str,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl crate::worker::Worker for MockWorker {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "mock worker"
        }

        async fn invoke(&self, _input: WorkerInput) -> Result<WorkerOutput, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed(text) => Ok(WorkerOutput {
                    response: text.to_string(),
                    confidence: 0.85,
                    tools_used: vec![],
                }),
                Behavior::Fail(message) => Err(WorkerError::Failed(message.to_string())),
            }
        }
    }

    /// Oracle whose decisions are fixed up front. An unset decision means the
    /// corresponding call fails.
    #[derive(Default)]
    struct ScriptedOracle {
        strategy: Option<StrategyDecision>,
        gate: Option<GateDecision>,
        reviews: Mutex<VecDeque<Result<ReviewFindings, String>>>,
        coordination: Option<Coordination>,
        exit: Option<ExitDecision>,
        validation: Option<ValidationOutcome>,
        review_calls: AtomicUsize,
        coordinate_calls: AtomicUsize,
        exit_calls: AtomicUsize,
        validation_calls: AtomicUsize,
    }

    fn scripted_failure() -> OracleError {
        OracleError::Malformed("scripted failure".to_string())
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn resolve_strategy(
            &self,
            _query: &str,
            _history: &[Turn],
            _available: &[WorkerDescriptor],
        ) -> Result<StrategyDecision, OracleError> {
            self.strategy.clone().ok_or_else(scripted_failure)
        }

        async fn validate_gate(
            &self,
            _query: &str,
            _selected: &BTreeSet<String>,
            _confidence: f64,
            _user_id: &str,
        ) -> Result<GateDecision, OracleError> {
            self.gate.clone().ok_or_else(scripted_failure)
        }

        async fn review_consistency(
            &self,
            _results: &BTreeMap<String, WorkerOutput>,
            _expected: &NormalizedParams,
        ) -> Result<ReviewFindings, OracleError> {
            self.review_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.reviews.lock().unwrap().pop_front();
            match next {
                Some(Ok(findings)) => Ok(findings),
                Some(Err(message)) => Err(OracleError::Malformed(message)),
                None => Ok(ReviewFindings {
                    consistent: true,
                    ..ReviewFindings::default()
                }),
            }
        }

        async fn coordinate(
            &self,
            _results: &BTreeMap<String, WorkerOutput>,
            _query: &str,
            _history: &[Turn],
            _gate_warnings: &[String],
            _review: &crate::oracle::types::ReviewContext,
        ) -> Result<Coordination, OracleError> {
            self.coordinate_calls.fetch_add(1, Ordering::SeqCst);
            self.coordination.clone().ok_or_else(scripted_failure)
        }

        async fn decide_early_exit(
            &self,
            _diagnosis: &Diagnosis,
            _results: &BTreeMap<String, WorkerOutput>,
            _query: &str,
        ) -> Result<ExitDecision, OracleError> {
            self.exit_calls.fetch_add(1, Ordering::SeqCst);
            self.exit.clone().ok_or_else(scripted_failure)
        }

        async fn validate_recommendations(
            &self,
            _recommendations: &[Recommendation],
            _diagnosis: &Diagnosis,
            _results: &BTreeMap<String, WorkerOutput>,
        ) -> Result<ValidationOutcome, OracleError> {
            self.validation_calls.fetch_add(1, Ordering::SeqCst);
            self.validation.clone().ok_or_else(scripted_failure)
        }
    }

    fn strategy_for(workers: &[&str]) -> StrategyDecision {
        StrategyDecision::Proceed(Strategy {
            selected_workers: workers.iter().map(|w| w.to_string()).collect(),
            intent: "test intent".to_string(),
            params: NormalizedParams {
                time_period: "last_7_days".to_string(),
                ..NormalizedParams::default()
            },
            comparison_mode: workers.len() > 1,
        })
    }

    fn gate_for(workers: &[&str]) -> GateDecision {
        GateDecision {
            approved_workers: workers.iter().map(|w| w.to_string()).collect(),
            warnings: vec![],
            valid: true,
            reason: None,
        }
    }

    fn recommendation(action: &str) -> Recommendation {
        Recommendation {
            priority: Priority::High,
            action: action.to_string(),
            reason: "supported by the data".to_string(),
            expected_impact: None,
        }
    }

    fn coordination_with(recommendations: Vec<Recommendation>) -> Coordination {
        Coordination {
            diagnosis: Diagnosis {
                root_causes: vec!["root cause".to_string()],
                correlations: vec![],
                severity: Severity::Medium,
                summary: "A diagnosis summary long enough to render beside recommendations."
                    .to_string(),
            },
            recommendations,
            confidence: 0.75,
        }
    }

    fn mismatch_findings(worker: &str) -> ReviewFindings {
        ReviewFindings {
            consistent: false,
            mismatches: vec![Mismatch {
                worker: worker.to_string(),
                expected: "last_7_days".to_string(),
                actual: "last_30_days".to_string(),
            }],
            worker_time_periods: BTreeMap::new(),
        }
    }

    struct Harness {
        engine: Engine,
        oracle: Arc<ScriptedOracle>,
        calls: HashMap<&'static str, Arc<AtomicUsize>>,
    }

    fn harness(oracle: ScriptedOracle, workers: Vec<(&'static str, Behavior)>) -> Harness {
        let mut registry = WorkerRegistry::new();
        let mut calls = HashMap::new();
        for (name, behavior) in workers {
            let counter = Arc::new(AtomicUsize::new(0));
            calls.insert(name, counter.clone());
            registry.register(Arc::new(MockWorker {
                name,
                behavior,
                calls: counter,
            }));
        }

        let oracle = Arc::new(oracle);
        let engine = Engine::new(
            Arc::new(registry),
            oracle.clone(),
            Arc::new(KeywordClassifier::default()),
            EngineConfig::default(),
        );
        Harness {
            engine,
            oracle,
            calls,
        }
    }

    fn input(query: &str) -> RunInput {
        RunInput {
            query: query.to_string(),
            session_id: None,
            user_id: "test-user".to_string(),
            history: vec![],
        }
    }

    #[tokio::test]
    async fn scenario_unclear_query_requests_clarification() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(StrategyDecision::Clarify {
                    question: "Could you clarify what you would like analyzed?".to_string(),
                }),
                ..ScriptedOracle::default()
            },
            vec![("budget", Behavior::Succeed("fine"))],
        );

        let outcome = harness.engine.execute(input("hello")).await;

        assert_eq!(
            outcome.response,
            "Could you clarify what you would like analyzed?"
        );
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.workers_invoked.is_empty());
        // No worker is ever invoked for a clarification run
        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scenario_two_consistent_workers_skip_requery() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                coordination: Some(coordination_with(vec![recommendation("Shift budget")])),
                exit: Some(ExitDecision::default()),
                validation: Some(ValidationOutcome {
                    validated: vec![recommendation("Shift budget")],
                    warnings: vec![],
                }),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        assert_eq!(outcome.requery_count, 0);
        assert_eq!(outcome.workers_invoked.len(), 2);
        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 1);
        assert_eq!(harness.calls["performance"].load(Ordering::SeqCst), 1);
        assert_eq!(harness.oracle.review_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.response.contains("## Recommendations"));
        assert_eq!(outcome.confidence, 0.75);
        assert_eq!(outcome.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn scenario_mismatch_triggers_single_requery() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                reviews: Mutex::new(VecDeque::from([
                    Ok(mismatch_findings("performance")),
                    Ok(ReviewFindings {
                        consistent: true,
                        ..ReviewFindings::default()
                    }),
                ])),
                coordination: Some(coordination_with(vec![recommendation("Shift budget")])),
                exit: Some(ExitDecision::default()),
                validation: Some(ValidationOutcome::default()),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        assert_eq!(outcome.requery_count, 1);
        // The requery re-invokes the full approved set, not just the
        // mismatching worker
        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 2);
        assert_eq!(harness.calls["performance"].load(Ordering::SeqCst), 2);
        assert_eq!(harness.oracle.review_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scenario_informational_single_worker_short_circuits() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["performance"])),
                gate: Some(gate_for(&["performance"])),
                ..ScriptedOracle::default()
            },
            vec![("performance", Behavior::Succeed("Spend was 1.2M this period."))],
        );

        let outcome = harness
            .engine
            .execute(input("what is the spend for last week"))
            .await;

        // Coordinator and validator oracles are never consulted
        assert_eq!(harness.oracle.coordinate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.oracle.validation_calls.load(Ordering::SeqCst), 0);
        assert!(outcome.recommendations.is_empty());
        assert_eq!(outcome.response, "Spend was 1.2M this period.");
        assert_eq!(outcome.confidence, 0.8);
    }

    #[tokio::test]
    async fn scenario_worker_failure_is_isolated() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                coordination: Some(coordination_with(vec![recommendation("Investigate")])),
                exit: Some(ExitDecision::default()),
                validation: Some(ValidationOutcome::default()),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Fail("warehouse unavailable")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        assert_eq!(outcome.workers_invoked, vec!["budget".to_string()]);
        assert_eq!(outcome.worker_errors.len(), 1);
        assert!(outcome.worker_errors["performance"].contains("warehouse unavailable"));
        assert!(!outcome.workers_invoked.contains(&"performance".to_string()));
        assert!(!outcome.response.is_empty());
    }

    #[tokio::test]
    async fn gate_block_prevents_all_invocations() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget"])),
                gate: Some(GateDecision {
                    approved_workers: BTreeSet::new(),
                    warnings: vec![],
                    valid: false,
                    reason: Some("user quota exceeded".to_string()),
                }),
                ..ScriptedOracle::default()
            },
            vec![("budget", Behavior::Succeed("fine"))],
        );

        let outcome = harness.engine.execute(input("budget status")).await;

        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 0);
        assert!(outcome.workers_invoked.is_empty());
        assert!(outcome.worker_errors.is_empty());
        assert!(outcome.response.contains("user quota exceeded"));
        assert_eq!(outcome.confidence, 0.0);
    }

    #[tokio::test]
    async fn requery_budget_is_exhausted_and_surfaced() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                reviews: Mutex::new(VecDeque::from([
                    Ok(mismatch_findings("performance")),
                    Ok(mismatch_findings("performance")),
                ])),
                coordination: Some(coordination_with(vec![recommendation("Investigate")])),
                exit: Some(ExitDecision::default()),
                validation: Some(ValidationOutcome {
                    validated: vec![recommendation("Investigate")],
                    warnings: vec![],
                }),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        // Initial round plus two requeries, then the budget stops the cycle
        assert_eq!(outcome.requery_count, 2);
        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 3);
        assert_eq!(harness.oracle.review_calls.load(Ordering::SeqCst), 2);
        // Inconsistency is a warning, never a fatal error
        assert!(outcome.response.contains("## Notes"));
        assert!(outcome.response.contains("remained inconsistent after 2"));
        assert!(outcome.confidence > 0.0);
    }

    #[tokio::test]
    async fn requery_count_never_exceeds_budget() {
        let always_mismatch: VecDeque<Result<ReviewFindings, String>> =
            (0..10).map(|_| Ok(mismatch_findings("budget"))).collect();
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget"])),
                gate: Some(gate_for(&["budget"])),
                reviews: Mutex::new(always_mismatch),
                coordination: Some(coordination_with(vec![])),
                exit: Some(ExitDecision::default()),
                ..ScriptedOracle::default()
            },
            vec![("budget", Behavior::Succeed("budget is pacing well"))],
        );

        let outcome = harness
            .engine
            .execute(input("optimize the budget allocation"))
            .await;

        assert!(outcome.requery_count <= EngineConfig::default().max_requeries);
        assert_eq!(outcome.requery_count, 2);
    }

    #[tokio::test]
    async fn reviewer_failure_fails_open() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                reviews: Mutex::new(VecDeque::from([Err("reviewer exploded".to_string())])),
                coordination: Some(coordination_with(vec![recommendation("Investigate")])),
                exit: Some(ExitDecision::default()),
                validation: Some(ValidationOutcome::default()),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        // No retry, run proceeds on the assumption of consistency
        assert_eq!(outcome.requery_count, 0);
        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 1);
        assert_eq!(harness.oracle.coordinate_calls.load(Ordering::SeqCst), 1);
        assert!(!outcome.response.is_empty());
    }

    #[tokio::test]
    async fn strategy_failure_degrades_run() {
        let harness = harness(
            ScriptedOracle::default(),
            vec![("budget", Behavior::Succeed("fine"))],
        );

        let outcome = harness.engine.execute(input("budget status")).await;

        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.response.contains("strategy resolution failed"));
        assert_eq!(harness.calls["budget"].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn coordination_failure_degrades_run() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                // coordination left unset -> the call fails
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness
            .engine
            .execute(input("why is revenue down this week?"))
            .await;

        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.response.contains("coordination failed"));
    }

    #[tokio::test]
    async fn early_exit_skips_validation() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                coordination: Some(coordination_with(vec![recommendation("Investigate")])),
                exit: Some(ExitDecision {
                    exit: true,
                    reason: Some("diagnosis already answers the question".to_string()),
                    final_response: Some("Everything is pacing as planned.".to_string()),
                    confidence: Some(0.9),
                }),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        assert_eq!(harness.oracle.validation_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.response, "Everything is pacing as planned.");
        assert_eq!(outcome.confidence, 0.9);
    }

    #[tokio::test]
    async fn reasoning_log_covers_every_phase() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(strategy_for(&["budget", "performance"])),
                gate: Some(gate_for(&["budget", "performance"])),
                coordination: Some(coordination_with(vec![recommendation("Shift budget")])),
                exit: Some(ExitDecision::default()),
                validation: Some(ValidationOutcome::default()),
                ..ScriptedOracle::default()
            },
            vec![
                ("budget", Behavior::Succeed("budget is pacing well")),
                ("performance", Behavior::Succeed("performance is steady")),
            ],
        );

        let outcome = harness.engine.execute(input("compare budget and performance")).await;

        // analysis, gate, fan-out, review, coordination (+ exit check),
        // validation, respond
        assert!(outcome.reasoning.len() >= 7);
        assert!(outcome
            .reasoning
            .iter()
            .any(|entry| entry == "Generated final response"));
    }

    #[tokio::test]
    async fn progress_events_are_emitted_per_phase() {
        let harness = harness(
            ScriptedOracle {
                strategy: Some(StrategyDecision::Clarify {
                    question: "What would you like analyzed?".to_string(),
                }),
                ..ScriptedOracle::default()
            },
            vec![],
        );

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        harness
            .engine
            .execute_with_progress(input("hello"), ProgressSink::new(tx))
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        // Analysis and respond phases both report started and completed
        let phases: Vec<&str> = events.iter().map(|e| e.phase.as_str()).collect();
        assert!(phases.contains(&"analysis"));
        assert!(phases.contains(&"respond"));
        assert!(events
            .iter()
            .any(|e| e.status == ProgressStatus::Started && e.phase == "analysis"));
        assert!(events
            .iter()
            .any(|e| e.status == ProgressStatus::Completed && e.phase == "respond"));
    }

    #[tokio::test]
    async fn workers_receive_normalized_parameters_and_requery_restatement() {
        struct RecordingWorker {
            seen: Arc<Mutex<Vec<WorkerInput>>>,
        }

        #[async_trait]
        impl crate::worker::Worker for RecordingWorker {
            fn name(&self) -> &str {
                "budget"
            }

            fn description(&self) -> &str {
                "recording worker"
            }

            async fn invoke(&self, input: WorkerInput) -> Result<WorkerOutput, WorkerError> {
                self.seen.lock().unwrap().push(input);
                Ok(WorkerOutput {
                    response: "recorded".to_string(),
                    confidence: 0.85,
                    tools_used: vec![],
                })
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(RecordingWorker { seen: seen.clone() }));

        let oracle = Arc::new(ScriptedOracle {
            strategy: Some(strategy_for(&["budget"])),
            gate: Some(gate_for(&["budget"])),
            reviews: Mutex::new(VecDeque::from([Ok(mismatch_findings("budget"))])),
            coordination: Some(coordination_with(vec![])),
            exit: Some(ExitDecision::default()),
            ..ScriptedOracle::default()
        });
        let engine = Engine::new(
            Arc::new(registry),
            oracle,
            Arc::new(KeywordClassifier::default()),
            EngineConfig::default(),
        );

        engine.execute(input("optimize the budget allocation")).await;

        let inputs = seen.lock().unwrap();
        assert_eq!(inputs.len(), 2);

        // Initial round restates the normalized parameters
        assert!(inputs[0].message.contains("time period last_7_days"));
        assert_eq!(
            inputs[0].context.get("time_period"),
            Some(&serde_json::json!("last_7_days"))
        );
        assert_eq!(inputs[0].context.get("requery"), Some(&serde_json::json!(false)));

        // The requery round adds an explicit restatement
        assert!(inputs[1].message.contains("Redo the analysis"));
        assert_eq!(inputs[1].context.get("requery"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let short = "short query";
        assert_eq!(preview(short), short);

        let long: String = "q".repeat(80);
        assert_eq!(preview(&long).len(), 50);
    }
}
