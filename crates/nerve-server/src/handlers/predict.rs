use std::sync::Arc;

use axum::{extract::State, Json};
use nerve_core::{char_len, AnnotationResult};
use tracing::error;

use crate::dto::{AppJson, PredictRequest};
use crate::error::AppError;
use crate::services::predict as predict_service;
use crate::ServerState;

/// POST /predict - Annotate a text with named entities.
pub async fn predict(
    State(state): State<Arc<ServerState>>,
    AppJson(req): AppJson<PredictRequest>,
) -> Result<Json<AnnotationResult>, AppError> {
    if let Some(limit) = state.max_input_chars {
        let chars = char_len(&req.text);
        if chars > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "text has {} chars, limit is {}",
                chars, limit
            )));
        }
    }

    let result = predict_service::annotate(&state.model, state.metrics.as_ref(), &req.text)
        .await
        .map_err(|e| {
            error!("Predict error: {}", e);
            AppError::from(e)
        })?;

    Ok(Json(result))
}
