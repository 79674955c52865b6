use thiserror::Error;

/// Failure to retrieve or parse one upstream feed.
///
/// Variants carry rendered messages rather than the underlying errors so the
/// value can be cloned to every request waiting on the same aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("feed {url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("failed to parse feed {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Request { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Status { url, .. }
            | FetchError::Body { url, .. }
            | FetchError::Parse { url, .. } => url,
        }
    }
}

/// Outcome of a failed news request, before it is turned into an HTTP response.
#[derive(Debug, Clone, Error)]
pub enum NewsError {
    #[error("{message}")]
    InvalidScope { scope: String, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
