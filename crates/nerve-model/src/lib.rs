//! Inference adapter for nerve.
//!
//! The rest of the service only sees [`ModelHandle`]: load it once at
//! startup, call [`ModelHandle::annotate`] per request, and unload it on
//! shutdown. Behind the handle sits a [`NerBackend`], the seam where a
//! concrete model plugs in. The built-in [`LexiconBackend`] reads its model
//! from a JSON lexicon file.

mod grouping;
mod handle;
mod lexicon;

pub use grouping::{group_entities, Tag, TokenTag};
pub use handle::ModelHandle;
pub use lexicon::{
    FallbackSpec, LabelSpec, LexiconBackend, LexiconEntry, LexiconError, LexiconModelFile,
    EMBEDDED_MODEL,
};

use nerve_core::{ModelError, RawEntity};

/// A named-entity model.
///
/// Backends are not required to be `Sync`: [`ModelHandle`] only ever calls
/// one backend from one thread at a time.
pub trait NerBackend: Send {
    /// Short backend identifier (e.g. "lexicon").
    fn backend_id(&self) -> &str;

    /// Extracts grouped entities from `text`.
    fn predict(&mut self, text: &str) -> Result<Vec<RawEntity>, ModelError>;
}
