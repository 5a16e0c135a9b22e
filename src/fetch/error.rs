use thiserror::Error;

/// Failure of a single route request, which fails the whole fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid feed URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// The request task panicked or was cancelled.
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl FetchError {
    pub fn transport(url: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
