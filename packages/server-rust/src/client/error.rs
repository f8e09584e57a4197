use reqwest::StatusCode;

/// Errors from outbound calls made through [`RestClient`](super::RestClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid default header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("{status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::InvalidUrl { .. } | Self::InvalidHeader { .. } => false,
        }
    }
}
