//! Everything between the orchestrator and the proving engine.
//!
//! - [`EngineBootstrap`]: single-flight engine start and wallet loading
//! - [`ProviderLoader`]: single-flight per-network data connection
//! - [`BalanceSynchronizer`]: throttled, coalesced commitment-log scans
//! - [`ChainClient`] / [`PublicWallet`]: the public side of the chain

pub mod balances;
pub mod bootstrap;
pub mod chain;
pub mod engine;
pub mod error;
pub mod events;
pub mod provider;

pub use balances::{BalanceSynchronizer, RefreshOutcome, DEFAULT_MIN_REFRESH_INTERVAL};
pub use bootstrap::{EngineBootstrap, EngineSettings, EngineState};
pub use chain::{ChainClient, EthersChainClient, PublicWallet, Receipt, ReceiptStatus};
pub use engine::{
    ContractCall, EngineStartContext, FeeNote, GasDetails, PopulatedTransaction, ProofBackend,
    ProofRequest, ProviderSettings, ProvingEngine, RawTransaction, ShieldRequest,
};
pub use error::{ChainError, EngineError, WalletError};
pub use events::{BalanceUpdate, EngineEvents, MerkleScanProgress, ScanStatus, TokenBalance};
pub use provider::{ProviderLoader, ProviderState};
