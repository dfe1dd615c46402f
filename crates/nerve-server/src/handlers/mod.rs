//! HTTP route handlers for the annotation server.

pub mod metrics;
pub mod predict;

use axum::Json;

use crate::dto::HealthResponse;

/// Health check endpoint. Static: does not probe the model.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
