use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error("both the vector and graph retrieval paths failed")]
    #[diagnostic(code(ptolemies::retrieval::both_paths_failed), help("check store connectivity"))]
    BothPathsFailed,

    #[error("vector store error: {0}")]
    #[diagnostic(code(ptolemies::retrieval::store))]
    Store(#[from] ptolemies_store::vector::StoreError),

    #[error("graph store error: {0}")]
    #[diagnostic(code(ptolemies::retrieval::graph))]
    Graph(#[from] ptolemies_store::graph::GraphError),
}

impl HasErrorKind for RetrievalError {
    fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::BothPathsFailed => ErrorKind::TransientExternal,
            RetrievalError::Store(e) => e.kind(),
            RetrievalError::Graph(e) => e.kind(),
        }
    }
}
