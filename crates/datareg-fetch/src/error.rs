#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transient failures that outlived the retry budget.
    #[error("Network error fetching {url} after {attempts} attempt(s): {reason}")]
    Network {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Non-retryable failure (4xx, DNS). `status` is `None` when no response arrived.
    #[error("Download failed for {url}: {reason}")]
    Download {
        status: Option<u16>,
        url: String,
        reason: String,
    },

    #[error("SHA-256 mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
        size_bytes: u64,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid expected sha256 '{0}': must be 64 hex digits")]
    InvalidExpectedHash(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Hash and size of whatever body was received before failing, for the failure row.
    pub fn received(&self) -> (&str, u64) {
        match self {
            FetchError::HashMismatch {
                actual, size_bytes, ..
            } => (actual.as_str(), *size_bytes),
            _ => ("", 0),
        }
    }

    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, FetchError::HashMismatch { .. })
    }
}
