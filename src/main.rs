//! Analysis Orchestrator Backend
//!
//! An HTTP service that coordinates independent analysis workers over a
//! workflow graph: strategy resolution, gate validation, concurrent fan-out,
//! consistency review with bounded requery, coordination and validation.

mod api;
mod config;
mod engine;
mod error;
mod llm;
mod oracle;
mod session;
mod worker;

use api::ApiContext;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use config::Config;
use engine::{Engine, KeywordClassifier};
use llm::GenerateClient;
use oracle::llm::LlmOracle;
use serde::Serialize;
use session::InMemorySessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;
use worker::llm::LlmWorker;
use worker::WorkerRegistry;

#[derive(Serialize)]
struct HelloResponse {
    message: String,
    status: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    workers: usize,
}

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Build the default worker registry: one LLM-backed worker per analysis
/// domain, all sharing the generation client
fn default_registry(client: &Arc<GenerateClient>) -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(LlmWorker::new(
        "performance",
        "Campaign performance metrics: impressions, clicks, conversions, revenue",
        "You are a performance analysis worker. Analyze campaign performance metrics \
         (impressions, clicks, conversions, revenue) for the requested period and report \
         clear, quantified findings.",
        client.clone(),
    )));
    registry.register(Arc::new(LlmWorker::new(
        "budget",
        "Budget pacing, spend allocation and overspend risk",
        "You are a budget analysis worker. Assess budget pacing, spend allocation and \
         overspend risk for the requested period and report clear, quantified findings.",
        client.clone(),
    )));
    registry.register(Arc::new(LlmWorker::new(
        "audience",
        "Audience segment performance and targeting insights",
        "You are an audience analysis worker. Evaluate audience segment performance and \
         targeting effectiveness for the requested period and report clear, quantified \
         findings.",
        client.clone(),
    )));
    registry.register(Arc::new(LlmWorker::new(
        "creative",
        "Creative effectiveness and inventory analysis",
        "You are a creative analysis worker. Evaluate creative effectiveness and inventory \
         coverage for the requested period and report clear, quantified findings.",
        client.clone(),
    )));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config.server);

    // Shared collaborators, built once and injected
    let client = Arc::new(GenerateClient::new(
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    ));
    if !client.has_api_key() {
        tracing::warn!(
            "GEMINI_API_KEY is not set - oracle and worker calls will fail and every \
             run will return a degraded response"
        );
    }
    let registry = Arc::new(default_registry(&client));
    info!(workers = registry.len(), "Worker registry initialized");

    let engine = Arc::new(Engine::new(
        registry.clone(),
        Arc::new(LlmOracle::new(client)),
        Arc::new(KeywordClassifier::default()),
        config.engine.clone(),
    ));

    let ctx = ApiContext {
        engine,
        sessions: Arc::new(InMemorySessionStore::new()),
        registry: registry.clone(),
    };

    // Build our application with routes
    let app = Router::new()
        // Health check and hello world
        .route("/", get(hello_world))
        .route("/api/health", get(health_check))
        // Chat API
        .route("/api/chat", post(api::chat::chat))
        .route("/api/chat/stream", post(api::chat::chat_stream))
        // Worker registry listing
        .route("/api/workers", get(api::workers::list_workers))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(ctx);

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("🚀 Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

async fn hello_world() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello from Analysis Orchestrator Backend!".to_string(),
        status: "ok".to_string(),
    })
}

async fn health_check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        workers: ctx.registry.len(),
    })
}
