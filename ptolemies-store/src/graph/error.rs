use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("sqlx error: {0}")]
    #[diagnostic(code(ptolemies::graph::sqlx), help("check the database URL and migrations"))]
    Sqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    #[diagnostic(code(ptolemies::graph::serde))]
    Serde(#[from] serde_json::Error),

    #[error("unknown node label: {0}")]
    #[diagnostic(code(ptolemies::graph::unknown_label))]
    UnknownLabel(String),
}

impl HasErrorKind for GraphError {
    fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Sqlx(_) => ErrorKind::StoreFatal,
            GraphError::Serde(_) | GraphError::UnknownLabel(_) => ErrorKind::DataShape,
        }
    }
}
