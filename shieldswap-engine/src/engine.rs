//! The proving engine interface.
//!
//! The engine owns the shielded-pool cryptography: note scanning, proof
//! generation and transaction population. The orchestrator only drives it
//! through [`ProvingEngine`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use shieldswap_artifacts::ArtifactCallbacks;
use shieldswap_common::{
    EvmGasType, NetworkConfig, NetworkName, OperationKind, TokenAmount, TxidVersion, WalletId,
};
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::events::EngineEvents;

// ═══════════════════════════════════════════════════════════════════════════════
// START-UP
// ═══════════════════════════════════════════════════════════════════════════════

/// Which prover implementation the engine should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofBackend {
    #[default]
    Native,
    Wasm,
}

/// Everything the engine receives when it starts.
#[derive(Clone)]
pub struct EngineStartContext {
    pub datastore_path: PathBuf,
    pub artifacts: Arc<dyn ArtifactCallbacks>,
    pub poi_node_urls: Vec<String>,
    pub events: EngineEvents,
}

/// Settings for the engine's data connection to one network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSettings {
    pub rpc_url: String,
    pub batch_max_count: u32,
}

impl ProviderSettings {
    pub fn for_network(network: &NetworkConfig) -> Self {
        Self {
            rpc_url: network.rpc_url.clone(),
            batch_max_count: network.provider_batch_max_count.max(1),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// A plain EVM call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// A call executed by the relay adapt contract inside a private transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// Fee paid out of the shielded balance as a private note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeNote {
    pub recipient: String,
    pub fee: TokenAmount,
}

/// Gas pricing used for estimates and population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasDetails {
    pub gas_type: EvmGasType,
    pub gas_price: U256,
    pub gas_limit: Option<U256>,
}

/// Inputs of one private transaction, proven as a whole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub network: NetworkName,
    pub txid_version: TxidVersion,
    pub kind: OperationKind,
    pub wallet: WalletId,
    pub encryption_key: String,
    /// Public destination for unshields, shielded address for transfers.
    pub recipient: String,
    pub amounts: Vec<TokenAmount>,
    /// Relay adapt calls; empty unless `kind` is a cross-contract call.
    pub calls: Vec<ContractCall>,
    /// Tokens shielded back to the wallet after the calls run.
    pub reshield_tokens: Vec<Address>,
    pub relay_fee: Option<FeeNote>,
    pub application_fee: Option<FeeNote>,
    pub min_gas_price: U256,
}

/// A proven transaction ready for submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulatedTransaction {
    pub transaction: RawTransaction,
    pub nullifiers: Vec<H256>,
    /// Proof-of-innocence proofs keyed by list, forwarded to relays untouched.
    pub poi_proofs: serde_json::Value,
}

/// Moves public tokens into the shielded pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldRequest {
    pub network: NetworkName,
    pub txid_version: TxidVersion,
    /// One-time key derived from the public wallet's signature.
    pub shield_private_key: H256,
    pub recipient: String,
    pub tokens: Vec<TokenAmount>,
    pub from_address: Address,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait ProvingEngine: Send + Sync {
    fn is_started(&self) -> bool;

    async fn start(&self, ctx: EngineStartContext) -> Result<(), EngineError>;

    async fn register_proof_backend(&self, backend: ProofBackend) -> Result<(), EngineError>;

    /// Open the engine's data connection for `network`.
    async fn load_provider(
        &self,
        network: &NetworkConfig,
        settings: &ProviderSettings,
    ) -> Result<(), EngineError>;

    async fn load_wallet(&self, wallet: &WalletId, encryption_key: &str) -> Result<(), EngineError>;

    /// Scan the commitment log of `network` for the given wallets.
    async fn refresh_balances(
        &self,
        network: &NetworkName,
        wallets: &[WalletId],
    ) -> Result<(), EngineError>;

    async fn balance_for_token(
        &self,
        wallet: &WalletId,
        network: &NetworkName,
        token: Address,
        only_spendable: bool,
    ) -> Result<U256, EngineError>;

    /// Estimate gas for a draft that is never proven or submitted.
    async fn gas_estimate_for_unproven(
        &self,
        request: &ProofRequest,
        gas: &GasDetails,
    ) -> Result<U256, EngineError>;

    /// Generate the proof, reporting 0–100 progress on `progress`.
    async fn generate_proof(
        &self,
        request: &ProofRequest,
        progress: mpsc::UnboundedSender<f64>,
    ) -> Result<(), EngineError>;

    async fn populate_proved(
        &self,
        request: &ProofRequest,
        gas: &GasDetails,
    ) -> Result<PopulatedTransaction, EngineError>;

    async fn gas_estimate_for_shield(&self, request: &ShieldRequest) -> Result<U256, EngineError>;

    async fn populate_shield(
        &self,
        request: &ShieldRequest,
        gas: &GasDetails,
    ) -> Result<RawTransaction, EngineError>;

    async fn shutdown(&self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldswap_common::default_networks;

    #[test]
    fn provider_settings_never_batch_above_network_limit() {
        let registry = default_networks();
        let mut network = registry.get(&"ethereum".into()).unwrap().clone();
        assert_eq!(ProviderSettings::for_network(&network).batch_max_count, 1);

        network.provider_batch_max_count = 0;
        assert_eq!(ProviderSettings::for_network(&network).batch_max_count, 1);
    }
}
