use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

/// Cache operations (`get`/`put`/`invalidate`) are infallible by design —
/// a miss or a corrupted entry is silently treated as absent. This exists
/// for construction-time misconfiguration only.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache capacity per shard must be greater than zero")]
    #[diagnostic(code(ptolemies::cache::invalid_capacity))]
    InvalidCapacity,
}

impl HasErrorKind for CacheError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Caller
    }
}
