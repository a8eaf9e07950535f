use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SupervisorError {
    #[error("reading checkpoint {path}: {source}")]
    #[diagnostic(code(ptolemies::crawl::checkpoint_read))]
    CheckpointRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing checkpoint {path}: {source}")]
    #[diagnostic(code(ptolemies::crawl::checkpoint_write))]
    CheckpointWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} is malformed: {source}")]
    #[diagnostic(code(ptolemies::crawl::checkpoint_parse))]
    CheckpointParse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("vector store error: {0}")]
    #[diagnostic(code(ptolemies::crawl::vector_store))]
    VectorStore(#[from] ptolemies_store::vector::StoreError),

    #[error("graph store error: {0}")]
    #[diagnostic(code(ptolemies::crawl::graph_store))]
    GraphStore(#[from] ptolemies_store::graph::GraphError),

    #[error("an unrecoverable store error aborted the crawl of {source_id}")]
    #[diagnostic(code(ptolemies::crawl::aborted))]
    CrawlAborted { source_id: String },
}

impl HasErrorKind for SupervisorError {
    fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::CheckpointRead { .. } | SupervisorError::CheckpointWrite { .. } => {
                ErrorKind::StoreFatal
            }
            SupervisorError::CheckpointParse { .. } => ErrorKind::DataShape,
            SupervisorError::VectorStore(e) => e.kind(),
            SupervisorError::GraphStore(e) => e.kind(),
            SupervisorError::CrawlAborted { .. } => ErrorKind::StoreFatal,
        }
    }
}
