//! Shared doubles for shieldswap integration tests.
//!
//! Everything here is in-memory and scriptable. The engine counts calls and
//! fails on demand; relays record what they are handed.

use std::sync::{Arc, Mutex, MutexGuard};

use ethers::types::Address;
use shieldswap_artifacts::{ArtifactCache, ArtifactStore};
use shieldswap_common::{
    default_networks, ArtifactProfile, NetworkConfig, NetworkName, NetworkRegistry,
    PoiArtifactConfig,
};

pub mod chain;
pub mod engine;
pub mod fetch;
pub mod relay;

pub use chain::{MockChainClient, MockPublicWallet, DEFAULT_GAS_PRICE, WALLET_TX_HASH};
pub use engine::{MockEngine, DEFAULT_GAS_ESTIMATE, POOL_CONTRACT};
pub use fetch::MockFetcher;
pub use relay::{advert, MockRelayChannel, MockSwarm, RELAYED_TX_HASH};

/// Name of the network [`test_network`] builds.
pub const TEST_NETWORK: &str = "testnet";

pub const SPEND_TOKEN: Address = Address::repeat_byte(0x01);
pub const FEE_TOKEN: Address = Address::repeat_byte(0x02);
pub const BUY_TOKEN: Address = Address::repeat_byte(0x03);
pub const RELAY_ADAPT: Address = Address::repeat_byte(0x0c);

/// A test network whose artifacts are bundled with the engine, so loading
/// its provider never touches a gateway.
pub fn test_network() -> NetworkConfig {
    let mut network = default_networks()
        .get(&NetworkName::new("sepolia"))
        .cloned()
        .unwrap_or_else(|err| panic!("{err}"));
    network.name = NetworkName::new(TEST_NETWORK);
    network.relay_adapt_contract = Some(RELAY_ADAPT);
    network.artifacts = ArtifactProfile {
        include_poi: false,
        ..ArtifactProfile::bundled(TEST_NETWORK)
    };
    network
}

/// A network that needs custom artifacts for a single circuit shape.
pub fn custom_artifact_network() -> NetworkConfig {
    let mut network = default_networks()
        .get(&NetworkName::new("sepolia"))
        .cloned()
        .unwrap_or_else(|err| panic!("{err}"));
    network.artifacts.shapes.truncate(1);
    network.artifacts.include_poi = false;
    network
}

pub fn test_registry() -> NetworkRegistry {
    NetworkRegistry::new([test_network()])
}

/// In-memory artifact cache over `fetcher`.
pub fn in_memory_cache(fetcher: Arc<MockFetcher>) -> Arc<ArtifactCache> {
    Arc::new(ArtifactCache::new(
        ArtifactStore::in_memory(),
        fetcher,
        PoiArtifactConfig::default(),
    ))
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
