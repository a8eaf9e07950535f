use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EmbedError {
    #[error("embedding provider rate-limited the request")]
    #[diagnostic(code(ptolemies::embed::rate_limited))]
    RateLimited,

    #[error("embedding provider error: {message}")]
    #[diagnostic(code(ptolemies::embed::provider))]
    Provider { message: String },

    #[error("transport error calling embedding provider: {source}")]
    #[diagnostic(code(ptolemies::embed::transport))]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("{count} inputs failed to embed after exhausting retries")]
    #[diagnostic(code(ptolemies::embed::partial_failure))]
    PartialFailure { count: usize },
}

impl HasErrorKind for EmbedError {
    fn kind(&self) -> ErrorKind {
        match self {
            EmbedError::RateLimited | EmbedError::Provider { .. } | EmbedError::Transport { .. } => {
                ErrorKind::TransientExternal
            }
            EmbedError::PartialFailure { .. } => ErrorKind::DataShape,
        }
    }
}
