//! Application-lifetime wiring of the orchestrator.
//!
//! One [`PrivacyContext`] owns the engine lifecycle, the per-network provider
//! state, the balance cache and the relay channels. Nothing here is global;
//! tests build as many contexts as they like.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shieldswap_artifacts::ArtifactCache;
use shieldswap_common::{NetworkConfig, NetworkName, NetworkRegistry, RetryPolicy, WalletId};
use shieldswap_engine::{
    BalanceSynchronizer, ChainClient, ChainError, EngineBootstrap, EngineEvents, EngineSettings,
    EthersChainClient, ProviderLoader, ProvingEngine, DEFAULT_MIN_REFRESH_INTERVAL,
};
use shieldswap_relay::RelaySelector;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::TxError;
use crate::plan::WalletCredentials;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default = "default_min_refresh_interval_ms")]
    pub balance_min_refresh_interval_ms: u64,
    #[serde(default)]
    pub balance_retry: RetryPolicy,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            balance_min_refresh_interval_ms: default_min_refresh_interval_ms(),
            balance_retry: RetryPolicy::default(),
        }
    }
}

fn default_min_refresh_interval_ms() -> u64 {
    DEFAULT_MIN_REFRESH_INTERVAL.as_millis() as u64
}

pub struct PrivacyContext {
    networks: NetworkRegistry,
    artifacts: Arc<ArtifactCache>,
    bootstrap: EngineBootstrap,
    providers: ProviderLoader,
    balances: BalanceSynchronizer,
    relays: RelaySelector,
    chains: HashMap<NetworkName, Arc<dyn ChainClient>>,
    balance_listener: Mutex<Option<JoinHandle<()>>>,
    wallets: Mutex<HashSet<WalletId>>,
}

impl PrivacyContext {
    pub fn new(
        engine: Arc<dyn ProvingEngine>,
        networks: NetworkRegistry,
        artifacts: Arc<ArtifactCache>,
        relays: RelaySelector,
        settings: ContextSettings,
    ) -> Self {
        let events = EngineEvents::default();
        let bootstrap = EngineBootstrap::new(engine.clone(), artifacts.clone(), settings.engine, events);
        let providers = ProviderLoader::new(bootstrap.clone(), artifacts.clone());
        let balances = BalanceSynchronizer::new(
            engine,
            settings.balance_retry,
            Duration::from_millis(settings.balance_min_refresh_interval_ms),
        );
        Self {
            networks,
            artifacts,
            bootstrap,
            providers,
            balances,
            relays,
            chains: HashMap::new(),
            balance_listener: Mutex::new(None),
            wallets: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_chain_client(mut self, network: impl Into<NetworkName>, client: Arc<dyn ChainClient>) -> Self {
        self.chains.insert(network.into(), client);
        self
    }

    /// Give every network without a chain client one over its RPC URL.
    pub fn connect_chain_clients(mut self) -> Result<Self, ChainError> {
        for network in self.networks.iter() {
            if !self.chains.contains_key(&network.name) {
                let client = EthersChainClient::new(&network.rpc_url)?;
                self.chains.insert(network.name.clone(), Arc::new(client));
            }
        }
        Ok(self)
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    pub fn network(&self, name: &NetworkName) -> Result<&NetworkConfig, TxError> {
        Ok(self.networks.get(name)?)
    }

    pub fn artifacts(&self) -> &Arc<ArtifactCache> {
        &self.artifacts
    }

    pub fn bootstrap(&self) -> &EngineBootstrap {
        &self.bootstrap
    }

    pub fn providers(&self) -> &ProviderLoader {
        &self.providers
    }

    pub fn balances(&self) -> &BalanceSynchronizer {
        &self.balances
    }

    pub fn relays(&self) -> &RelaySelector {
        &self.relays
    }

    pub fn chain(&self, network: &NetworkName) -> Result<Arc<dyn ChainClient>, TxError> {
        self.chains
            .get(network)
            .cloned()
            .ok_or_else(|| TxError::InvalidRequest(format!("no chain client for {}", network)))
    }

    /// Start the engine and begin mirroring its balance updates.
    pub async fn start(&self) -> Result<(), TxError> {
        self.bootstrap
            .ensure_started()
            .await
            .map_err(TxError::EngineNotReady)?;
        let mut listener = lock(&self.balance_listener);
        if listener.is_none() {
            *listener = Some(self.balances.spawn_listener(self.bootstrap.events()));
            info!("balance listener attached");
        }
        Ok(())
    }

    /// Engine ready and provider loaded for `network`.
    pub async fn prepare(&self, network: &NetworkName) -> Result<&NetworkConfig, TxError> {
        let config = self.network(network)?;
        self.start().await?;
        if !self.providers.load_provider(config).await {
            return Err(TxError::ProviderLoadFailed(network.clone()));
        }
        Ok(config)
    }

    /// Load `wallet` into the engine unless this context already did.
    pub async fn ensure_wallet(&self, wallet: &WalletCredentials) -> Result<(), TxError> {
        if lock(&self.wallets).contains(&wallet.id) {
            return Ok(());
        }
        self.bootstrap
            .load_wallet(&wallet.id, &wallet.encryption_key)
            .await?;
        lock(&self.wallets).insert(wallet.id.clone());
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), TxError> {
        let listener = lock(&self.balance_listener).take();
        if let Some(listener) = listener {
            listener.abort();
        }
        lock(&self.wallets).clear();
        self.providers.reset();
        self.bootstrap.shutdown().await?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
