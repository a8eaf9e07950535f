use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("sqlite error: {source}")]
    #[diagnostic(code(ptolemies::store::sqlite), help("check the database file and disk space"))]
    Sqlite {
        #[source]
        source: tokio_rusqlite::Error,
    },

    #[error("serialization error: {source}")]
    #[diagnostic(code(ptolemies::store::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to register sqlite-vec extension: {0}")]
    #[diagnostic(code(ptolemies::store::extension))]
    Extension(String),

    #[error("embedding dimension {got} does not match store dimension {expected}")]
    #[diagnostic(code(ptolemies::store::dimension_mismatch))]
    DimensionMismatch { expected: usize, got: usize },

    #[error("duplicate chunk_index {chunk_index} for document {document_id}")]
    #[diagnostic(code(ptolemies::store::duplicate_chunk))]
    DuplicateChunk {
        document_id: String,
        chunk_index: usize,
    },

    #[error("connection to the store was lost")]
    #[diagnostic(code(ptolemies::store::connection_lost))]
    ConnectionLost,
}

impl HasErrorKind for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Sqlite { .. } | StoreError::ConnectionLost | StoreError::Extension(_) => {
                ErrorKind::StoreFatal
            }
            StoreError::Serde { .. } | StoreError::DimensionMismatch { .. } | StoreError::DuplicateChunk { .. } => {
                ErrorKind::DataShape
            }
        }
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(source: tokio_rusqlite::Error) -> Self {
        StoreError::Sqlite { source }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(source: serde_json::Error) -> Self {
        StoreError::Serde { source }
    }
}
