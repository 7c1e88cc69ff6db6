//! Error types for relay discovery and submission.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// No relay peer answered for the requested chain or token.
    #[error("relay peer not found: {0}")]
    PeerNotFound(String),

    #[error("relay request timed out")]
    Timeout,

    #[error("no relay available for {0}")]
    NoRelayAvailable(String),

    #[error("rate limited by relay")]
    RateLimited,

    #[error("relay transport error: {0}")]
    Transport(String),

    #[error("invalid relay response: {0}")]
    InvalidResponse(String),

    /// The relay refused the transaction.
    #[error("relay rejected transaction: {0}")]
    Rejected(String),
}

impl RelayError {
    /// Misses that are normal during discovery and only worth a debug line.
    pub fn is_expected_miss(&self) -> bool {
        matches!(self, RelayError::PeerNotFound(_) | RelayError::Timeout)
    }

    /// Worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::RateLimited | RelayError::Transport(_) | RelayError::Timeout
        )
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else if err.is_decode() {
            RelayError::InvalidResponse(err.to_string())
        } else {
            RelayError::Transport(err.to_string())
        }
    }
}
