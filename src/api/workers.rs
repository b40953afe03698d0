//! Worker listing API

use crate::api::ApiContext;
use crate::worker::WorkerDescriptor;
use axum::{extract::State, Json};

/// GET /api/workers - list registered analysis workers
pub async fn list_workers(State(ctx): State<ApiContext>) -> Json<Vec<WorkerDescriptor>> {
    Json(ctx.registry.descriptors())
}
