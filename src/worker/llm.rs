//! LLM-backed analysis worker
//!
//! Wraps the shared generation client with a fixed domain brief. The engine's
//! composed instruction (query, normalized parameters, coordination context)
//! arrives as the input message; the brief pins the worker to its analysis
//! domain.

use crate::llm::GenerateClient;
use crate::worker::{Worker, WorkerError, WorkerInput, WorkerOutput};
use async_trait::async_trait;
use std::sync::Arc;

/// Default confidence reported by LLM workers
///
/// The generation API does not expose a calibrated confidence, so workers
/// report a fixed value and leave disagreement detection to the consistency
/// reviewer.
const DEFAULT_CONFIDENCE: f64 = 0.85;

/// An analysis worker that answers via the generation API
pub struct LlmWorker {
    name: String,
    description: String,
    brief: String,
    client: Arc<GenerateClient>,
}

impl LlmWorker {
    /// Create a new LLM worker
    ///
    /// # Arguments
    /// * `name` - Registry name (e.g., "performance")
    /// * `description` - One-line description for the strategy resolver
    /// * `brief` - Domain brief prepended to every invocation
    /// * `client` - Shared generation client
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        brief: impl Into<String>,
        client: Arc<GenerateClient>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            brief: brief.into(),
            client,
        }
    }

    fn compose_prompt(&self, input: &WorkerInput) -> String {
        format!("{}\n\n{}", self.brief, input.message)
    }
}

#[async_trait]
impl Worker for LlmWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: WorkerInput) -> Result<WorkerOutput, WorkerError> {
        let prompt = self.compose_prompt(&input);

        tracing::debug!(
            worker = %self.name,
            user_id = %input.user_id,
            session_id = ?input.session_id,
            prompt_len = prompt.len(),
            "Invoking LLM worker"
        );

        let response = self
            .client
            .generate(&prompt, false)
            .await
            .map_err(|e| WorkerError::Failed(e.to_string()))?;

        tracing::debug!(
            worker = %self.name,
            response_len = response.len(),
            "LLM worker completed"
        );

        Ok(WorkerOutput {
            response,
            confidence: DEFAULT_CONFIDENCE,
            tools_used: vec![],
        })
    }
}
