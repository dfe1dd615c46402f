use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse};
use nerve_monitor::{PrometheusRegistry, CONTENT_TYPE};

/// GET /metrics - Prometheus scrape endpoint, served on the metrics port.
pub async fn render(State(registry): State<Arc<PrometheusRegistry>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], registry.render())
}
