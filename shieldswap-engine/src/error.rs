//! Error types at the engine boundary.

use ethers::types::H256;
use thiserror::Error;

/// Errors reported by the proving engine and the components that drive it.
///
/// `Clone` so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("engine not started")]
    NotStarted,

    #[error("engine start failed: {0}")]
    StartFailed(String),

    #[error("engine state corrupted: {0}")]
    Corrupted(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // UPSTREAM
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream timeout: {0}")]
    Timeout(String),

    #[error("provider not loaded for {0}")]
    ProviderNotLoaded(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // WALLETS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("wallet decryption failed: {0}")]
    Decryption(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // TRANSACTIONS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("gas estimate failed: {0}")]
    GasEstimate(String),

    #[error("proof generation failed: {0}")]
    Proof(String),

    #[error("transaction population failed: {0}")]
    Populate(String),

    #[error("engine error: {0}")]
    Other(String),
}

impl EngineError {
    /// Errors worth retrying with backoff. Decryption failures never are.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::RateLimited(_) | EngineError::Network(_) | EngineError::Timeout(_)
        )
    }

    /// The engine must be shut down and started again before further use.
    pub fn requires_restart(&self) -> bool {
        matches!(self, EngineError::Corrupted(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EngineError::RateLimited(_))
    }
}

/// Errors from the public chain RPC.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid RPC URL {0}")]
    InvalidUrl(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("timed out waiting for receipt of {0:?}")]
    ReceiptTimeout(H256),
}

/// Errors from the user's public (non-shielded) wallet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("request rejected by user")]
    UserRejected,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("sending transaction failed: {0}")]
    Send(String),
}
