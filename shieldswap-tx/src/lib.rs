//! Private transaction orchestration.
//!
//! A [`PrivacyContext`] wires the engine, artifact cache, balances and relay
//! channels together; a [`PrivateTransactionBuilder`] runs shield, unshield,
//! transfer and swap operations on top of it.
//!
//! ```text
//! PrivateTransactionBuilder
//!   └── PrivacyContext
//!         ├── EngineBootstrap ─► ProvingEngine
//!         ├── ProviderLoader ──► ArtifactCache
//!         ├── BalanceSynchronizer
//!         ├── RelaySelector ───► RelayChannel (HTTP | P2P)
//!         └── ChainClient (per network)
//! ```

pub mod builder;
pub mod context;
pub mod error;
pub mod fees;
pub mod plan;
pub mod shield;
pub mod swap;

pub use builder::{BuilderSettings, PrivateTransactionBuilder};
pub use context::{ContextSettings, PrivacyContext};
pub use error::TxError;
pub use fees::{layer_fees, relay_fee, scale_min_out, FeeBreakdown, FeeInputs, FeeSource};
pub use plan::{
    ConfirmedTx, FeePayment, ShieldIntent, SpendAction, SpendRequest, TransactionPlan, TxOutcome,
    WalletCredentials,
};
pub use shield::{derive_shield_key, SHIELD_SIGNATURE_MESSAGE};
pub use swap::{swap_calls, SwapQuote, SwapStep};
