//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Workflow engine configuration
    pub engine: EngineConfig,
    /// LLM endpoint configuration
    pub llm: LlmConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Workflow engine configuration
///
/// All knobs that bound a single run. Built once at startup and injected
/// into the engine; never mutated per-run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of requery rounds when worker results disagree
    pub max_requeries: u32,
    /// Per-worker invocation timeout in seconds
    pub worker_timeout_secs: u64,
    /// Overall run timeout in seconds
    pub run_timeout_secs: u64,
    /// Upper bound on phase transitions per run (loop safety net)
    pub max_transitions: u32,
    /// Number of recent conversation turns fed to the strategy resolver
    pub history_limit: usize,
    /// Minimum diagnosis summary length before it is rendered alongside
    /// recommendations
    pub diagnosis_summary_min_chars: usize,
    /// Maximum number of validation warnings rendered under "Notes"
    pub max_response_notes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_requeries: 2,
            worker_timeout_secs: 60,
            run_timeout_secs: 300, // 5 minutes
            max_transitions: 32,
            history_limit: 10,
            diagnosis_summary_min_chars: 50,
            max_response_notes: 3,
        }
    }
}

/// LLM endpoint configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key (empty means calls fail and runs degrade gracefully)
    pub api_key: String,
    /// Model name
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            engine: EngineConfig {
                max_requeries: env::var("MAX_REQUERIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.max_requeries),
                worker_timeout_secs: env::var("WORKER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.worker_timeout_secs),
                run_timeout_secs: env::var("RUN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.run_timeout_secs),
                ..defaults
            },
            llm: LlmConfig {
                api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| LlmConfig::default().model),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
