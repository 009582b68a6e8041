use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualensError {
    /// Failure talking to the CI system. Aborts only the build being
    /// crawled; the discovery batch continues and retries next cycle.
    #[error("CI fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QualensError {
    /// True for errors that only abort the current build's crawl.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QualensError::Fetch(_) | QualensError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, QualensError>;
