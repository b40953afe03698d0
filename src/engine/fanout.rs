//! Concurrent fan-out supervisor
//!
//! Invokes every approved worker concurrently and fans the results back into
//! a single outcome. Each invocation is isolated: a failure, panic or timeout
//! in one worker never cancels or delays its siblings. The supervisor returns
//! only after all invocations have settled; completion order is not observed
//! anywhere downstream.

use crate::engine::progress::{ProgressSink, ProgressStatus};
use crate::worker::{WorkerError, WorkerInput, WorkerOutput, WorkerRegistry};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;

/// Settled results of one fan-out round
///
/// The key sets of `results` and `errors` are disjoint and together cover
/// every requested worker.
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    /// Successful worker outputs, keyed by worker name
    pub results: BTreeMap<String, WorkerOutput>,
    /// Failure messages, keyed by worker name
    pub errors: BTreeMap<String, String>,
}

/// Invoke all named workers concurrently and wait for every invocation to
/// settle
///
/// # Arguments
/// * `registry` - Worker registry
/// * `names` - Workers to invoke (an empty list completes immediately)
/// * `build_input` - Builds the per-worker invocation input
/// * `worker_timeout` - Per-worker deadline; a worker that misses it is
///   recorded as an error rather than blocking the barrier
/// * `progress` - Sink for per-worker completion events
pub async fn invoke_workers<F>(
    registry: &WorkerRegistry,
    names: &[String],
    build_input: F,
    worker_timeout: Duration,
    progress: &ProgressSink,
) -> FanOutOutcome
where
    F: Fn(&str) -> WorkerInput,
{
    let mut outcome = FanOutOutcome::default();
    if names.is_empty() {
        return outcome;
    }

    let mut handles = Vec::with_capacity(names.len());
    for name in names {
        let Some(worker) = registry.get(name) else {
            tracing::warn!(worker = %name, "Approved worker is not registered");
            outcome
                .errors
                .insert(name.clone(), WorkerError::NotRegistered(name.clone()).to_string());
            continue;
        };

        let input = build_input(name);
        let handle = tokio::spawn(async move {
            timeout(worker_timeout, worker.invoke(input)).await
        });
        handles.push((name.clone(), handle));
    }

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(Ok(output))) => {
                tracing::debug!(
                    worker = %name,
                    confidence = output.confidence,
                    "Worker completed"
                );
                progress.emit(
                    "invoke_workers",
                    ProgressStatus::Running,
                    json!({ "completed_worker": name, "confidence": output.confidence }),
                );
                outcome.results.insert(name, output);
            }
            Ok(Ok(Err(error))) => {
                tracing::error!(worker = %name, error = %error, "Worker failed");
                outcome.errors.insert(name, error.to_string());
            }
            Ok(Err(_elapsed)) => {
                let error = WorkerError::Timeout(worker_timeout.as_secs());
                tracing::error!(worker = %name, error = %error, "Worker timed out");
                outcome.errors.insert(name, error.to_string());
            }
            Err(join_error) => {
                let error = WorkerError::Aborted(join_error.to_string());
                tracing::error!(worker = %name, error = %error, "Worker task aborted");
                outcome.errors.insert(name, error.to_string());
            }
        }
    }

    outcome
}
