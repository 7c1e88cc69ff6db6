//! Shared types for the shieldswap private transaction orchestrator.
//!
//! Everything in here is plain data plus two small behaviours that several
//! crates lean on: monotonic progress reporting and the retry policy used at
//! the engine boundary.

pub mod network;
pub mod progress;
pub mod retry;
pub mod types;

pub use network::{
    default_networks, ArtifactProfile, CircuitShape, DistributionSource, EvmGasType,
    NetworkConfig, NetworkEnvironment, NetworkName, NetworkRegistry, PoiArtifactConfig,
    UnknownNetwork,
};
pub use progress::{ProgressEvent, ProgressRange, ProgressReporter, ProgressStage};
pub use retry::RetryPolicy;
pub use types::{
    OperationKind, RelayQuote, ShieldedBalanceInfo, TokenAmount, TxidVersion, WalletId,
    BASIS_POINTS,
};

/// Re-exported so downstream crates agree on one amount/address type.
pub use ethers::types::{Address, H256, U256};
