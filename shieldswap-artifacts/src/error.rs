use thiserror::Error;

/// Failure of a single HTTP fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("artifact store error: {0}")]
    Storage(String),

    #[error("no distribution source configured for {0}")]
    NoDistribution(String),

    #[error("all {attempts} gateways failed for {path}: {last}")]
    AllGatewaysFailed {
        path: String,
        attempts: usize,
        last: FetchError,
    },

    #[error("failed to decompress {path}: {reason}")]
    Decompression { path: String, reason: String },

    #[error("artifact {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },
}

impl From<sled::Error> for ArtifactError {
    fn from(err: sled::Error) -> Self {
        ArtifactError::Storage(err.to_string())
    }
}
