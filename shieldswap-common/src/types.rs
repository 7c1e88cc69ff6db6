//! Core value types shared across the orchestrator crates.

use std::fmt;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Denominator for every fee expressed in basis points.
pub const BASIS_POINTS: u32 = 10_000;

/// Identifier of a shielded wallet inside the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Merkle-tree/txid layout the engine builds transactions for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxidVersion {
    #[serde(rename = "V2_PoseidonMerkle")]
    V2PoseidonMerkle,
    #[serde(rename = "V3_PoseidonMerkle")]
    V3PoseidonMerkle,
}

impl TxidVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V2PoseidonMerkle => "V2_PoseidonMerkle",
            Self::V3PoseidonMerkle => "V3_PoseidonMerkle",
        }
    }
}

/// The private operations the builder knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Shield,
    Unshield,
    Transfer,
    CrossContract,
}

impl OperationKind {
    /// Operations whose value leaves the shielded pool pay the protocol's
    /// unshield fee.
    pub fn pays_unshield_fee(self) -> bool {
        matches!(self, Self::Unshield | Self::CrossContract)
    }

    /// Operations spending from the shielded balance need a relay.
    pub fn requires_relay(self) -> bool {
        !matches!(self, Self::Shield)
    }

    /// Cross-contract calls are executed by the relay adapt contract.
    pub fn uses_relay_adapt(self) -> bool {
        matches!(self, Self::CrossContract)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shield => "shield",
            Self::Unshield => "unshield",
            Self::Transfer => "transfer",
            Self::CrossContract => "cross_contract",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount of one ERC-20 token, in minor units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: Address,
    pub amount: U256,
}

impl TokenAmount {
    pub fn new(token: Address, amount: U256) -> Self {
        Self { token, amount }
    }
}

/// Shielded balance of one token on one network.
///
/// `pending` is value the protocol has not yet cleared through its
/// proof-of-innocence checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedBalanceInfo {
    pub total: U256,
    pub spendable: U256,
    pub pending: U256,
}

impl ShieldedBalanceInfo {
    pub fn new(total: U256, spendable: U256) -> Self {
        Self {
            total,
            spendable,
            pending: total.saturating_sub(spendable),
        }
    }
}

/// A relay's fee offer, fetched fresh for every transaction attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayQuote {
    pub relay_address: String,
    /// Fee token units charged per unit of gas, scaled by `fee_rate_scale`.
    pub fee_per_unit_gas: U256,
    pub fee_token: Address,
    #[serde(rename = "feesID")]
    pub fees_id: String,
    /// Token decimal ratio dividing the fee product.
    pub fee_rate_scale: U256,
    /// Unix seconds after which the relay no longer honours the quote.
    pub expires_at: u64,
}
