#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("File not found (404): {0}")]
    NotFound(String),
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server error (5xx): {0}")]
    ServerError(String),
    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("Failed to write temporary file: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// The archive has no file for the station/year
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }

    /// Network-level failures that may succeed on another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Request(_) | FetchError::ServerError(_))
    }
}
