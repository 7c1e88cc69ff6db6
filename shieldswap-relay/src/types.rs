//! Relay wire and domain types.

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use shieldswap_common::{RelayQuote, TxidVersion};

/// Chain identity as relays see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRef {
    #[serde(rename = "type")]
    pub chain_type: u8,
    pub id: u64,
}

/// A relay's published fee for one token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAdvert {
    pub relay_address: String,
    pub fee_token: Address,
    pub fee_per_unit_gas: U256,
    #[serde(rename = "feesID")]
    pub fees_id: String,
    #[serde(default = "unit_scale")]
    pub fee_rate_scale: U256,
    /// Unix seconds.
    pub expires_at: u64,
}

impl FeeAdvert {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    pub fn into_quote(self) -> RelayQuote {
        RelayQuote {
            relay_address: self.relay_address,
            fee_per_unit_gas: self.fee_per_unit_gas,
            fee_token: self.fee_token,
            fees_id: self.fees_id,
            fee_rate_scale: self.fee_rate_scale,
            expires_at: self.expires_at,
        }
    }
}

fn unit_scale() -> U256 {
    U256::one()
}

/// A proven transaction handed to a relay, independent of the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySubmission {
    pub chain: ChainRef,
    pub txid_version: TxidVersion,
    pub to: Address,
    pub data: Bytes,
    pub relay_address: String,
    pub fees_id: String,
    pub nullifiers: Vec<H256>,
    pub min_gas_price: U256,
    pub use_relay_adapt: bool,
    pub poi_proofs: serde_json::Value,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEST RELAY (HTTP)
// ═══════════════════════════════════════════════════════════════════════════════

/// `GET /fees` response of the self-hosted test relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRelayFees {
    pub relay_address: String,
    #[serde(rename = "feesID")]
    pub fees_id: String,
    pub expires_at: u64,
    #[serde(default = "unit_scale")]
    pub fee_rate_scale: U256,
    /// Fee per unit gas keyed by token address.
    pub fees: std::collections::BTreeMap<Address, U256>,
}

impl TestRelayFees {
    pub fn adverts(self) -> Vec<FeeAdvert> {
        let TestRelayFees {
            relay_address,
            fees_id,
            expires_at,
            fee_rate_scale,
            fees,
        } = self;
        fees.into_iter()
            .map(|(fee_token, fee_per_unit_gas)| FeeAdvert {
                relay_address: relay_address.clone(),
                fee_token,
                fee_per_unit_gas,
                fees_id: fees_id.clone(),
                fee_rate_scale,
                expires_at,
            })
            .collect()
    }
}

/// `POST /transact` body of the self-hosted test relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRelayTransact {
    pub to: Address,
    pub data: Bytes,
    pub chain_type: u8,
    pub chain_id: u64,
    pub min_gas_price: U256,
    #[serde(rename = "feesID")]
    pub fees_id: String,
    pub use_relay_adapt: bool,
    pub proof_of_innocence_bundle: serde_json::Value,
    pub txid_version: TxidVersion,
}

impl From<&RelaySubmission> for TestRelayTransact {
    fn from(submission: &RelaySubmission) -> Self {
        Self {
            to: submission.to,
            data: submission.data.clone(),
            chain_type: submission.chain.chain_type,
            chain_id: submission.chain.id,
            min_gas_price: submission.min_gas_price,
            fees_id: submission.fees_id.clone(),
            use_relay_adapt: submission.use_relay_adapt,
            proof_of_innocence_bundle: submission.poi_proofs.clone(),
            txid_version: submission.txid_version,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestRelayResponse {
    #[serde(rename_all = "camelCase")]
    Accepted { tx_hash: H256 },
    Failed { error: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// RELAY SWARM (P2P)
// ═══════════════════════════════════════════════════════════════════════════════

/// Broadcast payload for the public relay swarm.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmBroadcast {
    pub txid_version: TxidVersion,
    pub to: Address,
    pub data: Bytes,
    pub relay_address: String,
    #[serde(rename = "feesID")]
    pub fees_id: String,
    pub chain: ChainRef,
    pub nullifiers: Vec<H256>,
    pub min_gas_price: U256,
    pub use_relay_adapt: bool,
    pub poi_proofs: serde_json::Value,
}

impl From<&RelaySubmission> for SwarmBroadcast {
    fn from(submission: &RelaySubmission) -> Self {
        Self {
            txid_version: submission.txid_version,
            to: submission.to,
            data: submission.data.clone(),
            relay_address: submission.relay_address.clone(),
            fees_id: submission.fees_id.clone(),
            chain: submission.chain,
            nullifiers: submission.nullifiers.clone(),
            min_gas_price: submission.min_gas_price,
            use_relay_adapt: submission.use_relay_adapt,
            poi_proofs: submission.poi_proofs.clone(),
        }
    }
}
