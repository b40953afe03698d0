//! Generation API client
//!
//! Makes direct HTTP requests against the `generateContent` endpoint using a
//! shared `reqwest::Client` for connection pooling. JSON mode is requested
//! via `response_mime_type` when the caller needs structured output.

use crate::llm::types::{
    GenerateRequest, GenerateResponse, GenerationConfig, RequestContent, RequestPart,
};
use crate::llm::GenerateError;

const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the text-generation API
///
/// Cheap to clone behind an `Arc`; holds the pooled HTTP client, the API key
/// and the model name. The base URL can be overridden for tests.
#[derive(Debug, Clone)]
pub struct GenerateClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GenerateClient {
    /// Create a new client for the given API key and model
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Whether an API key has been configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Send a prompt and return the generated text
    ///
    /// # Arguments
    /// * `prompt` - The prompt to send
    /// * `force_json` - If true, request JSON response format
    ///
    /// # Errors
    /// Returns `GenerateError` if the API key is missing, the HTTP request
    /// fails, the response cannot be parsed, the prompt is blocked, or no
    /// text content is present in the response.
    pub async fn generate(&self, prompt: &str, force_json: bool) -> Result<String, GenerateError> {
        if self.api_key.is_empty() {
            return Err(GenerateError::MissingApiKey);
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let generation_config = force_json.then(|| GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
        });

        let request_body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config,
        };

        tracing::debug!(
            model = %self.model,
            force_json = force_json,
            prompt_len = prompt.len(),
            "Calling generation API"
        );

        let response = self
            .http
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GenerateError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());

            tracing::error!(
                status_code = status_code,
                error_body = %error_body,
                "Generation API returned error status"
            );

            if status_code == 429 {
                return Err(GenerateError::RateLimited(error_body));
            }
            return Err(GenerateError::Status {
                status: status_code,
                body: error_body,
            });
        }

        let response_body = response
            .text()
            .await
            .map_err(|e| GenerateError::Parse(format!("failed to read response body: {}", e)))?;

        let parsed: GenerateResponse = serde_json::from_str(&response_body).map_err(|e| {
            GenerateError::Parse(format!("{} - response body: {}", e, response_body))
        })?;

        if let Some(feedback) = &parsed.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Err(GenerateError::Blocked(reason.clone()));
            }
        }

        let text = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .filter(|text| !text.is_empty())
            .ok_or(GenerateError::EmptyResponse)?;

        tracing::debug!(
            response_len = text.len(),
            "Successfully received response from generation API"
        );

        Ok(text)
    }
}
