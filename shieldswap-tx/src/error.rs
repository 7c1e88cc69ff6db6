//! Errors of the private transaction builder.
//!
//! None of these are retried inside the builder; the caller decides.

use ethers::types::{Address, H256, U256};
use shieldswap_common::{NetworkName, UnknownNetwork};
use shieldswap_engine::{ChainError, EngineError, WalletError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    // ═══════════════════════════════════════════════════════════════════════════════
    // PREPARATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("engine not ready: {0}")]
    EngineNotReady(EngineError),

    #[error("provider load failed for {0}")]
    ProviderLoadFailed(NetworkName),

    #[error("no relay available for {0}")]
    NoRelayAvailable(NetworkName),

    #[error(transparent)]
    UnknownNetwork(#[from] UnknownNetwork),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // FEES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("insufficient fee token balance for {token:?}: need {required}, have {available}")]
    InsufficientFeeTokenBalance {
        token: Address,
        required: U256,
        available: U256,
    },

    #[error("amount {amount} does not cover fees of {fees}")]
    AmountTooSmallAfterFees { amount: U256, fees: U256 },

    // ═══════════════════════════════════════════════════════════════════════════════
    // PROVING AND SUBMISSION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("proof generation failed: {0}")]
    ProofGenerationFailed(EngineError),

    #[error("populated transaction has no nullifiers")]
    MissingNullifiers,

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("transaction {0:?} reverted")]
    TransactionReverted(H256),

    // ═══════════════════════════════════════════════════════════════════════════════
    // PASS-THROUGH
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Wallet(WalletError),
}

impl TxError {
    /// The engine is in a state only a restart fixes.
    pub fn requires_restart(&self) -> bool {
        match self {
            TxError::EngineNotReady(err) | TxError::ProofGenerationFailed(err) | TxError::Engine(err) => {
                err.requires_restart()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupted_engine_state_needs_restart() {
        let err = TxError::from(EngineError::Corrupted("utxo tree".into()));
        assert!(err.requires_restart());
        assert!(!TxError::MissingNullifiers.requires_restart());
        assert!(!TxError::ProofGenerationFailed(EngineError::Proof("oom".into())).requires_restart());
    }
}
