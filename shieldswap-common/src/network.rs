//! Network definitions.
//!
//! A [`NetworkConfig`] carries everything the orchestrator needs to know about
//! one chain deployment of the shielded pool: how gas is priced, which relay
//! channel is used, how the engine's data connection is throttled, and which
//! proving artifacts have to be present before the first proof.

use std::collections::BTreeMap;
use std::fmt;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TxidVersion;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable name of a network, e.g. `ethereum` or `sepolia`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkName(String);

impl NetworkName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How gas is priced on a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmGasType {
    /// Legacy `gasPrice`, no access lists.
    Type0,
    /// Legacy `gasPrice` with access lists.
    Type1,
    /// EIP-1559 `maxFeePerGas` / `maxPriorityFeePerGas`.
    Type2,
}

impl EvmGasType {
    pub fn uses_max_fee(self) -> bool {
        matches!(self, Self::Type2)
    }
}

/// Test networks submit through a self-hosted relay over HTTP; production
/// networks broadcast to the public relay swarm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnvironment {
    #[default]
    Production,
    Test,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACT PROFILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Circuit shape: number of spent notes × number of created notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CircuitShape {
    pub inputs: u8,
    pub outputs: u8,
}

impl CircuitShape {
    pub const fn new(inputs: u8, outputs: u8) -> Self {
        Self { inputs, outputs }
    }
}

impl fmt::Display for CircuitShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}x{:02}", self.inputs, self.outputs)
    }
}

/// Where a family of artifacts can be downloaded from.
///
/// Gateways are tried in order; `content_hash` addresses the artifact
/// directory on every gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSource {
    pub content_hash: String,
    pub gateways: Vec<String>,
}

/// Artifacts a network needs before it can prove.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactProfile {
    /// Prefix under which every entry of this network is stored.
    pub storage_prefix: String,
    /// Networks that can use the artifacts bundled with the engine set this
    /// to `false`; only the proof-of-innocence family is primed for them.
    #[serde(default)]
    pub requires_custom_artifacts: bool,
    #[serde(default = "default_transact_shapes")]
    pub shapes: Vec<CircuitShape>,
    #[serde(default)]
    pub distribution: Option<DistributionSource>,
    /// Whether proof-of-innocence circuits are primed for this network.
    #[serde(default = "bool_true")]
    pub include_poi: bool,
}

impl ArtifactProfile {
    /// Profile for a network served by the engine's bundled artifacts.
    pub fn bundled(storage_prefix: impl Into<String>) -> Self {
        Self {
            storage_prefix: storage_prefix.into(),
            requires_custom_artifacts: false,
            shapes: default_transact_shapes(),
            distribution: None,
            include_poi: true,
        }
    }
}

/// Network-agnostic proof-of-innocence circuits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiArtifactConfig {
    #[serde(default = "default_poi_shapes")]
    pub shapes: Vec<CircuitShape>,
    pub distribution: DistributionSource,
}

impl Default for PoiArtifactConfig {
    fn default() -> Self {
        Self {
            shapes: default_poi_shapes(),
            distribution: DistributionSource {
                content_hash: "QmZrP9zaZw2LwErT2yA6VpMWm65UdToQiKj4DtStVsUJHr".to_string(),
                gateways: default_gateways(),
            },
        }
    }
}

fn default_transact_shapes() -> Vec<CircuitShape> {
    vec![
        CircuitShape::new(1, 1),
        CircuitShape::new(1, 2),
        CircuitShape::new(1, 3),
        CircuitShape::new(2, 2),
        CircuitShape::new(2, 3),
        CircuitShape::new(8, 2),
        CircuitShape::new(13, 1),
    ]
}

fn default_poi_shapes() -> Vec<CircuitShape> {
    vec![CircuitShape::new(3, 3), CircuitShape::new(13, 13)]
}

pub fn default_gateways() -> Vec<String> {
    vec![
        "https://ipfs-lb.com".to_string(),
        "https://ipfs.io".to_string(),
        "https://dweb.link".to_string(),
    ]
}

fn bool_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// NETWORK CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for a single network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: NetworkName,
    pub chain_id: u64,
    /// Chain family discriminator sent to relays; `0` is EVM.
    #[serde(default)]
    pub chain_type: u8,
    #[serde(default)]
    pub environment: NetworkEnvironment,
    pub gas_type: EvmGasType,
    /// The single upstream RPC endpoint used for the engine's data connection.
    pub rpc_url: String,
    /// Per-request batch size of the engine's data connection. Anything above
    /// one reliably trips upstream rate limits.
    #[serde(default = "default_provider_batch_max_count")]
    pub provider_batch_max_count: u32,
    pub wrapped_native_token: Address,
    /// Contract that executes cross-contract calls and re-shields their output.
    #[serde(default)]
    pub relay_adapt_contract: Option<Address>,
    #[serde(default = "default_unshield_fee_bps")]
    pub unshield_fee_bps: u32,
    #[serde(default = "default_shield_fee_bps")]
    pub shield_fee_bps: u32,
    /// Self-hosted relay used on test networks.
    #[serde(default)]
    pub test_relay_url: Option<String>,
    #[serde(default = "default_txid_version")]
    pub txid_version: TxidVersion,
    pub artifacts: ArtifactProfile,
}

impl NetworkConfig {
    pub fn is_test(&self) -> bool {
        self.environment == NetworkEnvironment::Test
    }
}

fn default_provider_batch_max_count() -> u32 {
    1
}

fn default_unshield_fee_bps() -> u32 {
    25
}

fn default_shield_fee_bps() -> u32 {
    25
}

fn default_txid_version() -> TxidVersion {
    TxidVersion::V2PoseidonMerkle
}

/// Networks available to one orchestrator instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRegistry {
    networks: BTreeMap<NetworkName, NetworkConfig>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub NetworkName);

impl NetworkRegistry {
    pub fn new(networks: impl IntoIterator<Item = NetworkConfig>) -> Self {
        Self {
            networks: networks
                .into_iter()
                .map(|config| (config.name.clone(), config))
                .collect(),
        }
    }

    pub fn get(&self, name: &NetworkName) -> Result<&NetworkConfig, UnknownNetwork> {
        self.networks
            .get(name)
            .ok_or_else(|| UnknownNetwork(name.clone()))
    }

    pub fn insert(&mut self, config: NetworkConfig) {
        self.networks.insert(config.name.clone(), config);
    }

    pub fn names(&self) -> impl Iterator<Item = &NetworkName> {
        self.networks.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values()
    }
}

/// Built-in deployments. Operators override or extend these through the
/// configuration file.
pub fn default_networks() -> NetworkRegistry {
    NetworkRegistry::new([
        NetworkConfig {
            name: NetworkName::new("ethereum"),
            chain_id: 1,
            chain_type: 0,
            environment: NetworkEnvironment::Production,
            gas_type: EvmGasType::Type2,
            rpc_url: "https://eth.llamarpc.com".to_string(),
            provider_batch_max_count: default_provider_batch_max_count(),
            wrapped_native_token: static_address("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            relay_adapt_contract: None,
            unshield_fee_bps: default_unshield_fee_bps(),
            shield_fee_bps: default_shield_fee_bps(),
            test_relay_url: None,
            txid_version: default_txid_version(),
            artifacts: ArtifactProfile::bundled("ethereum"),
        },
        NetworkConfig {
            name: NetworkName::new("arbitrum"),
            chain_id: 42161,
            chain_type: 0,
            environment: NetworkEnvironment::Production,
            gas_type: EvmGasType::Type2,
            rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
            provider_batch_max_count: default_provider_batch_max_count(),
            wrapped_native_token: static_address("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            relay_adapt_contract: None,
            unshield_fee_bps: default_unshield_fee_bps(),
            shield_fee_bps: default_shield_fee_bps(),
            test_relay_url: None,
            txid_version: default_txid_version(),
            artifacts: ArtifactProfile::bundled("arbitrum"),
        },
        NetworkConfig {
            name: NetworkName::new("bsc"),
            chain_id: 56,
            chain_type: 0,
            environment: NetworkEnvironment::Production,
            gas_type: EvmGasType::Type0,
            rpc_url: "https://bsc-dataseed.binance.org".to_string(),
            provider_batch_max_count: default_provider_batch_max_count(),
            wrapped_native_token: static_address("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
            relay_adapt_contract: None,
            unshield_fee_bps: default_unshield_fee_bps(),
            shield_fee_bps: default_shield_fee_bps(),
            test_relay_url: None,
            txid_version: default_txid_version(),
            artifacts: ArtifactProfile::bundled("bsc"),
        },
        NetworkConfig {
            name: NetworkName::new("sepolia"),
            chain_id: 11_155_111,
            chain_type: 0,
            environment: NetworkEnvironment::Test,
            gas_type: EvmGasType::Type2,
            rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
            provider_batch_max_count: default_provider_batch_max_count(),
            wrapped_native_token: static_address("0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14"),
            relay_adapt_contract: None,
            unshield_fee_bps: default_unshield_fee_bps(),
            shield_fee_bps: default_shield_fee_bps(),
            test_relay_url: Some("http://127.0.0.1:3010".to_string()),
            txid_version: default_txid_version(),
            artifacts: ArtifactProfile {
                storage_prefix: "sepolia".to_string(),
                requires_custom_artifacts: true,
                shapes: default_transact_shapes(),
                distribution: Some(DistributionSource {
                    content_hash: "QmUsmnK4PFc7zDp2cmC4wBZxYLjNyRgWfs5GNcJJ2uLcpU".to_string(),
                    gateways: default_gateways(),
                }),
                include_poi: true,
            },
        },
    ])
}

fn static_address(literal: &str) -> Address {
    literal
        .parse()
        .expect("built-in network address literal is valid hex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_display_is_zero_padded() {
        assert_eq!(CircuitShape::new(1, 2).to_string(), "01x02");
        assert_eq!(CircuitShape::new(13, 1).to_string(), "13x01");
    }

    #[test]
    fn default_registry_resolves_known_networks() {
        let registry = default_networks();
        let sepolia = registry.get(&NetworkName::new("Sepolia")).unwrap();
        assert!(sepolia.is_test());
        assert!(sepolia.artifacts.requires_custom_artifacts);
        assert!(sepolia.test_relay_url.is_some());

        let ethereum = registry.get(&"ethereum".into()).unwrap();
        assert!(!ethereum.is_test());
        assert_eq!(ethereum.unshield_fee_bps, 25);
        assert_eq!(ethereum.provider_batch_max_count, 1);
    }

    #[test]
    fn unknown_network_is_reported() {
        let registry = default_networks();
        let err = registry.get(&NetworkName::new("nowhere")).unwrap_err();
        assert_eq!(err.to_string(), "unknown network: nowhere");
    }

    #[test]
    fn artifact_profile_defaults_from_json() {
        let profile: ArtifactProfile =
            serde_json::from_str(r#"{"storage_prefix":"custom"}"#).unwrap();
        assert!(!profile.requires_custom_artifacts);
        assert!(profile.include_poi);
        assert!(!profile.shapes.is_empty());
    }
}
