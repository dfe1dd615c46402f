//! HTTP server exposing a named-entity model.
//!
//! Two listeners: the API (`/health`, `/predict`) and, on its own port, the
//! Prometheus scrape endpoint (`/metrics`).

mod dto;
mod error;
mod handlers;
mod services;

pub use error::AppError;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use nerve_config::Settings;
use nerve_model::ModelHandle;
use nerve_monitor::PrometheusRegistry;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by the API handlers.
pub struct ServerState {
    pub model: ModelHandle,
    pub metrics: Arc<PrometheusRegistry>,
    pub max_input_chars: Option<usize>,
}

impl ServerState {
    pub fn new(model: ModelHandle, metrics: Arc<PrometheusRegistry>) -> Self {
        Self {
            model,
            metrics,
            max_input_chars: None,
        }
    }

    pub fn with_max_input_chars(mut self, limit: Option<usize>) -> Self {
        self.max_input_chars = limit;
        self
    }
}

/// Builds the API router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                id = %uuid::Uuid::new_v4(),
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let logged_routes = Router::new()
        .route("/predict", post(handlers::predict::predict))
        .layer(trace_layer);

    Router::new()
        .merge(logged_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Builds the scrape router for the metrics port.
pub fn metrics_router(registry: Arc<PrometheusRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics::render))
        .with_state(registry)
}

/// Loads the model, starts the metrics listener and serves the API until
/// Ctrl-C. A model that fails to load aborts startup.
pub async fn serve(settings: Settings) -> Result<()> {
    let model = ModelHandle::load(settings.model_path.as_deref(), settings.inference_timeout())
        .context("model failed to load")?;
    info!(
        backend = model.backend_id(),
        timeout_ms = model.timeout().as_millis() as u64,
        "Model ready"
    );
    let registry = Arc::new(PrometheusRegistry::new());

    if let Some(addr) = settings.metrics_addr() {
        spawn_metrics_server(&addr, Arc::clone(&registry)).await;
    }

    let state = Arc::new(
        ServerState::new(model.clone(), registry).with_max_input_chars(settings.max_input_chars),
    );

    let addr = settings.api_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Starting server on {}", addr);

    serve_with_listener(listener, state, shutdown_signal()).await?;

    model.unload();
    Ok(())
}

/// Serves the API on an already-bound listener until `shutdown` resolves.
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Binds the metrics port. Failure is logged and the API keeps running.
async fn spawn_metrics_server(addr: &str, registry: Arc<PrometheusRegistry>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Could not start metrics server on {}: {}", addr, e);
            return;
        }
    };
    info!("Prometheus metrics available on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics_router(registry)).await {
            warn!("Metrics server stopped: {}", e);
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
