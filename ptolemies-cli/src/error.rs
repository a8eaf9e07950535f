use miette::Diagnostic;
use ptolemies_core::config::ConfigError;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use ptolemies_crawl::SupervisorError;
use ptolemies_ingest::fetch::FetchError;
use ptolemies_store::graph::GraphError;
use ptolemies_store::vector::StoreError;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("loading configuration: {0}")]
    #[diagnostic(code(ptolemies::cli::config))]
    Config(#[from] ConfigError),

    #[error("opening vector store: {0}")]
    #[diagnostic(code(ptolemies::cli::vector_store))]
    VectorStore(#[from] StoreError),

    #[error("opening graph store: {0}")]
    #[diagnostic(code(ptolemies::cli::graph_store))]
    GraphStore(#[from] GraphError),

    #[error("crawl: {0}")]
    #[diagnostic(code(ptolemies::cli::crawl))]
    Crawl(#[from] SupervisorError),

    #[error("building fetcher: {0}")]
    #[diagnostic(code(ptolemies::cli::fetcher))]
    Fetch(#[from] FetchError),

    #[error("unknown source id {source_id}")]
    #[diagnostic(code(ptolemies::cli::unknown_source))]
    UnknownSource { source_id: String },

    #[error("invalid --retention value {value}: {message}")]
    #[diagnostic(code(ptolemies::cli::bad_retention))]
    BadRetention { value: String, message: String },
}

impl HasErrorKind for CliError {
    fn kind(&self) -> ErrorKind {
        match self {
            CliError::Config(_) => ErrorKind::Caller,
            CliError::VectorStore(e) => e.kind(),
            CliError::GraphStore(e) => e.kind(),
            CliError::Crawl(e) => e.kind(),
            CliError::Fetch(e) => e.kind(),
            CliError::UnknownSource { .. } => ErrorKind::Caller,
            CliError::BadRetention { .. } => ErrorKind::Caller,
        }
    }
}
