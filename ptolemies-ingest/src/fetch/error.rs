use miette::Diagnostic;
use ptolemies_core::error::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("network error fetching {url}: {source}")]
    #[diagnostic(code(ptolemies::fetch::network), help("check connectivity and DNS for the host"))]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out fetching {url}")]
    #[diagnostic(code(ptolemies::fetch::timeout))]
    Timeout { url: String },

    #[error("robots.txt disallows {url}")]
    #[diagnostic(code(ptolemies::fetch::robots_disallowed))]
    RobotsDisallowed { url: String },

    #[error("http error {status} fetching {url}")]
    #[diagnostic(code(ptolemies::fetch::http_error))]
    HttpError { url: String, status: u16 },

    #[error("body of {url} exceeded the size cap ({size} bytes)")]
    #[diagnostic(code(ptolemies::fetch::too_large))]
    TooLarge { url: String, size: usize },

    #[error("too many redirects fetching {url}")]
    #[diagnostic(code(ptolemies::fetch::redirect_loop))]
    TooManyRedirects { url: String },

    #[error("redirect from {url} left the allowed domain")]
    #[diagnostic(code(ptolemies::fetch::redirect_offsite))]
    RedirectOffDomain { url: String },
}

impl HasErrorKind for FetchError {
    fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => ErrorKind::TransientExternal,
            FetchError::HttpError { status, .. } if *status == 429 || *status >= 500 => {
                ErrorKind::TransientExternal
            }
            FetchError::RobotsDisallowed { .. }
            | FetchError::HttpError { .. }
            | FetchError::TooLarge { .. }
            | FetchError::TooManyRedirects { .. }
            | FetchError::RedirectOffDomain { .. } => ErrorKind::PermanentExternal,
        }
    }
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
