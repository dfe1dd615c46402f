//! Annotation pipeline: count, time the model call, normalize.

use nerve_core::{char_len, normalize, AnnotationResult, NerveError};
use nerve_model::ModelHandle;
use nerve_monitor::{LatencyTimer, MetricsRecorder};
use tracing::info;

/// Annotates `text` with the loaded model.
///
/// The request is counted before the model runs, so failed calls are
/// counted too. Latency covers the model call only and is recorded whether
/// or not the call succeeds.
pub async fn annotate(
    model: &ModelHandle,
    metrics: &dyn MetricsRecorder,
    text: &str,
) -> Result<AnnotationResult, NerveError> {
    metrics.inc_requests();
    info!("request_chars={}", char_len(text));

    let timer = LatencyTimer::start(metrics);
    let spans = model.annotate(text).await;
    let latency = timer.stop();

    Ok(normalize(text, spans?, latency)?)
}
