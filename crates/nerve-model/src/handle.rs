//! Loaded-model handle with serialized, time-bounded inference.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nerve_core::{EntitySpan, ModelError, RawEntity};
use tracing::{info, warn};

use crate::lexicon::LexiconBackend;
use crate::NerBackend;

/// Shared handle to the one loaded model.
///
/// Cloning is cheap; all clones share the backend. Calls are serialized on
/// a mutex and each runs on the blocking pool under `timeout`. A call that
/// times out keeps its blocking thread until the backend returns; its
/// result is discarded.
#[derive(Clone)]
pub struct ModelHandle {
    backend: Arc<Mutex<Box<dyn NerBackend>>>,
    backend_id: String,
    timeout: Duration,
}

impl ModelHandle {
    /// Loads the lexicon model from `path`, or the embedded model when
    /// `path` is `None`.
    pub fn load(path: Option<&Path>, timeout: Duration) -> Result<Self, ModelError> {
        let backend = match path {
            Some(p) => {
                info!("Loading model from {}", p.display());
                LexiconBackend::from_path(p)?
            }
            None => {
                info!("Loading embedded model");
                LexiconBackend::embedded()?
            }
        };
        info!(
            model = backend.name(),
            phrases = backend.phrase_count(),
            "Model loaded"
        );
        Ok(Self::from_backend(Box::new(backend), timeout))
    }

    pub fn from_backend(backend: Box<dyn NerBackend>, timeout: Duration) -> Self {
        let backend_id = backend.backend_id().to_string();
        Self {
            backend: Arc::new(Mutex::new(backend)),
            backend_id,
            timeout,
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the model over `text` and coerces its output into spans.
    pub async fn annotate(&self, text: &str) -> Result<Vec<EntitySpan>, ModelError> {
        let backend = Arc::clone(&self.backend);
        let input = text.to_owned();

        let task = tokio::task::spawn_blocking(move || -> Result<Vec<RawEntity>, ModelError> {
            let mut guard = backend.lock().unwrap_or_else(|poisoned| {
                warn!("Model lock poisoned by an earlier panic; reusing backend");
                poisoned.into_inner()
            });
            guard.predict(&input)
        });

        let raw = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) if join_err.is_panic() => {
                return Err(ModelError::Panicked(panic_message(join_err.into_panic())));
            }
            Ok(Err(join_err)) => return Err(ModelError::Inference(join_err.to_string())),
            Err(_) => {
                return Err(ModelError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        raw.into_iter().map(EntitySpan::from_raw).collect()
    }

    /// Releases this handle. The backend is dropped once no in-flight call
    /// still holds it.
    pub fn unload(self) {
        let in_flight = Arc::strong_count(&self.backend) - 1;
        info!(backend = %self.backend_id, in_flight, "Unloading model");
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
