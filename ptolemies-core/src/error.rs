//! Top-level error taxonomy shared across crates.
//!
//! Each crate defines its own `thiserror`-derived error enum for its own
//! operations (see `FetchError`, `ExtractError`, `ChunkError`, `EmbedError`,
//! `StoreError`, `CacheError`, `RetrievalError`, `SupervisorError`). This
//! module defines the five-way classification those errors fall into and the
//! wrapper type the CLI and crawl reports consult, following the dual
//! `thiserror` + `miette::Diagnostic` derive used throughout the codebase
//! this engine grew out of.

use miette::Diagnostic;
use thiserror::Error;

/// The five error kinds from the error handling design. Every leaf error type
/// implements `HasErrorKind` so the orchestrator and `verify` can dispatch on
/// this without matching every concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, Timeout, RateLimited, Provider5xx — retried with backoff;
    /// after exhaustion, recorded against the URL/batch and the run continues.
    TransientExternal,
    /// RobotsDisallowed, HttpError 4xx non-429, ExtractionFailed, TooLarge —
    /// URL is skipped for the current run.
    PermanentExternal,
    /// DuplicateChunk, InvariantViolation, SchemaMismatch — abort the
    /// affected document commit, leave prior state intact.
    DataShape,
    /// ConnectionLost, DiskFull, CorruptIndex — abort the entire crawl.
    StoreFatal,
    /// BadQuery, UnknownFilterField — rejected at the API boundary.
    Caller,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientExternal => "transient_external",
            ErrorKind::PermanentExternal => "permanent_external",
            ErrorKind::DataShape => "data_shape",
            ErrorKind::StoreFatal => "store_fatal",
            ErrorKind::Caller => "caller",
        }
    }

    /// Whether the orchestrator should retry an operation that failed with
    /// this kind. Only transient-external errors are retried (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientExternal)
    }
}

pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}

/// Top-level error wrapper used by the CLI and the per-crawl report. Leaf
/// crates convert their own error enums into this via `From`.
#[derive(Debug, Error, Diagnostic)]
#[error("{kind_str}: {message}")]
#[diagnostic(code(ptolemies::engine_error))]
pub struct EngineError {
    kind_str: &'static str,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl EngineError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            kind_str: kind.as_str(),
            message: message.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.kind_str {
            "transient_external" => ErrorKind::TransientExternal,
            "permanent_external" => ErrorKind::PermanentExternal,
            "data_shape" => ErrorKind::DataShape,
            "store_fatal" => ErrorKind::StoreFatal,
            _ => ErrorKind::Caller,
        }
    }
}
