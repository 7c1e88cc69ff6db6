//! Requests, plans and outcomes of private operations.

use ethers::types::{Address, H256, U256};
use serde::Serialize;
use shieldswap_common::{NetworkName, OperationKind, RelayQuote, TokenAmount, WalletId};
use shieldswap_engine::{PopulatedTransaction, ProofRequest};

use crate::fees::FeeBreakdown;
use crate::swap::SwapQuote;

/// A shielded wallet and the key that decrypts it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletCredentials {
    pub id: WalletId,
    pub encryption_key: String,
}

impl WalletCredentials {
    pub fn new(id: impl Into<String>, encryption_key: impl Into<String>) -> Self {
        Self {
            id: WalletId::new(id),
            encryption_key: encryption_key.into(),
        }
    }
}

/// Token the relay is paid in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeePayment {
    pub token: Address,
    /// Pay in the network's native token; resolved to its wrapped form.
    pub native: bool,
}

impl FeePayment {
    pub fn token(token: Address) -> Self {
        Self { token, native: false }
    }

    pub fn native() -> Self {
        Self {
            token: Address::zero(),
            native: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpendAction {
    /// Withdraw to a public address.
    Unshield { to: Address },
    /// Send to another shielded address.
    Transfer { to: String },
    /// Swap through a router and re-shield the output to `reshield_to`.
    Swap { quote: SwapQuote, reshield_to: String },
}

impl SpendAction {
    pub fn kind(&self) -> OperationKind {
        match self {
            SpendAction::Unshield { .. } => OperationKind::Unshield,
            SpendAction::Transfer { .. } => OperationKind::Transfer,
            SpendAction::Swap { .. } => OperationKind::CrossContract,
        }
    }
}

/// A spend from the shielded balance, submitted through a relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendRequest {
    pub network: NetworkName,
    pub wallet: WalletCredentials,
    pub spend: TokenAmount,
    pub action: SpendAction,
    pub fee: FeePayment,
}

impl SpendRequest {
    pub fn unshield(
        network: impl Into<NetworkName>,
        wallet: WalletCredentials,
        spend: TokenAmount,
        to: Address,
        fee: FeePayment,
    ) -> Self {
        Self {
            network: network.into(),
            wallet,
            spend,
            action: SpendAction::Unshield { to },
            fee,
        }
    }

    pub fn transfer(
        network: impl Into<NetworkName>,
        wallet: WalletCredentials,
        spend: TokenAmount,
        to: impl Into<String>,
        fee: FeePayment,
    ) -> Self {
        Self {
            network: network.into(),
            wallet,
            spend,
            action: SpendAction::Transfer { to: to.into() },
            fee,
        }
    }

    /// Sells `quote.from_amount` of `quote.sell_token`.
    pub fn swap(
        network: impl Into<NetworkName>,
        wallet: WalletCredentials,
        quote: SwapQuote,
        reshield_to: impl Into<String>,
        fee: FeePayment,
    ) -> Self {
        Self {
            network: network.into(),
            wallet,
            spend: TokenAmount::new(quote.sell_token, quote.from_amount),
            action: SpendAction::Swap {
                quote,
                reshield_to: reshield_to.into(),
            },
            fee,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.action.kind()
    }

    /// Minimum output protecting a swap; `None` for other actions.
    pub fn min_out(&self) -> Option<U256> {
        match &self.action {
            SpendAction::Swap { quote, .. } => Some(quote.min_received),
            _ => None,
        }
    }
}

/// Public tokens to move into the shielded pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShieldIntent {
    pub network: NetworkName,
    /// Shielded address receiving the tokens.
    pub recipient: String,
    pub tokens: Vec<TokenAmount>,
}

/// Everything decided for one spend. Lives only for the duration of the
/// operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionPlan {
    pub network: NetworkName,
    pub kind: OperationKind,
    pub spend: TokenAmount,
    pub relay: RelayQuote,
    pub gas_estimate: U256,
    pub gas_price: U256,
    pub fees: FeeBreakdown,
    pub min_out: Option<U256>,
    pub request: ProofRequest,
    pub populated: Option<PopulatedTransaction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmedTx {
    pub network: NetworkName,
    pub tx_hash: H256,
    /// Present for relayed spends.
    pub fees: Option<FeeBreakdown>,
}

/// How an operation ended when it did not fail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TxOutcome {
    Confirmed(ConfirmedTx),
    /// The user declined to sign or send in their public wallet.
    UserRejected,
}

impl TxOutcome {
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            TxOutcome::Confirmed(confirmed) => Some(confirmed.tx_hash),
            TxOutcome::UserRejected => None,
        }
    }
}
