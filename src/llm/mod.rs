//! Shared LLM HTTP client
//!
//! Direct HTTP client for the `generateContent` text-generation API, used by
//! both the decision oracle adapter (JSON mode) and the LLM-backed analysis
//! workers (plain text).

pub mod client;
pub mod types;

pub use client::GenerateClient;

use thiserror::Error;

/// Errors that can occur while calling the generation API
#[derive(Error, Debug)]
pub enum GenerateError {
    /// No API key was configured
    #[error("API key is empty")]
    MissingApiKey,

    /// The HTTP request itself failed (connect, DNS, timeout)
    #[error("Failed to send HTTP request to generation API: {0}")]
    Request(String),

    /// The API rejected the request with a rate-limit status
    #[error("Generation API rate limit exceeded (HTTP 429): {0}")]
    RateLimited(String),

    /// The API returned a non-success status
    #[error("Generation API returned error status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw error body
        body: String,
    },

    /// The response body could not be parsed
    #[error("Failed to parse generation API response: {0}")]
    Parse(String),

    /// The prompt was blocked by the API's safety layer
    #[error("Generation API blocked the prompt: {0}")]
    Blocked(String),

    /// The response carried no usable text
    #[error("Generation API response contains no text")]
    EmptyResponse,
}
