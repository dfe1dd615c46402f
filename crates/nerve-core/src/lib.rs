//! Core domain types and error definitions for nerve.
//!
//! This crate provides the types shared by every layer of the service:
//!
//! - [`EntitySpan`]: a single tagged entity, as returned to clients
//! - [`RawEntity`]: the loosely-typed record a model backend emits
//! - [`AnnotationResult`]: the response envelope for one request
//! - [`NerveError`], [`ModelError`], [`NormalizationError`]: the closed error set
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use nerve_core::{normalize, Category, EntitySpan};
//!
//! let spans = vec![EntitySpan {
//!     label: "ORG".to_string(),
//!     score: 0.99,
//!     text: "Apple".to_string(),
//!     start: 0,
//!     end: 5,
//! }];
//!
//! let result = normalize("Apple shipped.", spans, Duration::from_millis(3)).unwrap();
//! assert_eq!(result.category, Category::News);
//! assert_eq!(result.meta.chars, 14);
//! ```

mod normalize;

pub use normalize::{categorize, char_len, normalize};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the inference adapter or a model backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The model could not be loaded at startup.
    #[error("Failed to load model: {0}")]
    Load(String),

    /// The backend failed while running inference.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Inference did not finish within the configured budget.
    #[error("Inference timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The backend returned a record that cannot be coerced into an [`EntitySpan`].
    #[error("Malformed model output: {0}")]
    Malformed(String),

    /// The backend panicked; the panic was contained.
    #[error("Model backend panicked: {0}")]
    Panicked(String),
}

/// Errors raised while turning adapter output into an [`AnnotationResult`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("Entity {index} has score {score} outside [0, 1]")]
    ScoreOutOfRange { index: usize, score: f64 },

    #[error("Entity {index} has offsets {start}..{end} outside input of {chars} chars")]
    InvalidOffsets {
        index: usize,
        start: usize,
        end: usize,
        chars: usize,
    },
}

/// Any failure of the annotation pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NerveError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

/// A tagged entity span.
///
/// Offsets are character offsets into the input text; `end` is exclusive.
/// Field names on the wire follow the grouped-entities pipeline shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    /// Entity category, e.g. `ORG`, `PER`, `LOC`, `MISC`.
    #[serde(rename = "entity_group")]
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
    /// The surface text of the entity.
    #[serde(rename = "word")]
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl EntitySpan {
    /// Coerces a backend record into a fixed-shape span.
    ///
    /// Numeric subtypes are widened to `f64` / `usize`; records with a
    /// non-finite score or reversed offsets are rejected.
    pub fn from_raw(raw: RawEntity) -> Result<Self, ModelError> {
        let score = f64::from(raw.score);
        if !score.is_finite() {
            return Err(ModelError::Malformed(format!(
                "non-finite score for '{}'",
                raw.word
            )));
        }

        let start = usize::try_from(raw.start)
            .map_err(|e| ModelError::Malformed(format!("start offset: {}", e)))?;
        let end = usize::try_from(raw.end)
            .map_err(|e| ModelError::Malformed(format!("end offset: {}", e)))?;
        if end < start {
            return Err(ModelError::Malformed(format!(
                "end {} before start {} for '{}'",
                end, start, raw.word
            )));
        }

        Ok(Self {
            label: raw.entity_group,
            score,
            text: raw.word,
            start,
            end,
        })
    }
}

/// An entity record as emitted by a model backend, before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub entity_group: String,
    pub score: f32,
    pub word: String,
    pub start: u32,
    pub end: u32,
}

/// Coarse document category derived from the entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    News,
    Other,
}

/// Request-level metadata attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Number of characters in the input text.
    pub chars: usize,
    /// Wall-clock time spent in the model call only.
    pub latency_seconds: f64,
}

/// The response body for a successful annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    pub entities: Vec<EntitySpan>,
    pub category: Category,
    pub meta: Meta,
}
