//! Shared model types, identifiers, error taxonomy, configuration, and the
//! metrics contract used by every Ptolemies crate.

pub mod backoff;
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod model;

pub use error::{EngineError, ErrorKind, HasErrorKind};
pub use ids::{ChunkId, DocumentId, EmbeddingId, SourceId};
