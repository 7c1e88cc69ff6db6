//! Per-network provider loading.
//!
//! Opening the engine's data connection is expensive and the upstream RPC
//! rate-limits aggressively, so each network is loaded at most once at a time
//! and remembered once it succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use shieldswap_artifacts::ArtifactCache;
use shieldswap_common::{NetworkConfig, NetworkName};
use tracing::{error, info, warn};

use crate::bootstrap::{lock, EngineBootstrap};
use crate::engine::ProviderSettings;

type LoadFuture = Shared<BoxFuture<'static, bool>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    NotLoaded,
    Loading,
    Loaded,
}

#[derive(Clone)]
pub struct ProviderLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    bootstrap: EngineBootstrap,
    artifacts: Arc<ArtifactCache>,
    loaded: Mutex<HashSet<NetworkName>>,
    in_flight: Mutex<HashMap<NetworkName, LoadFuture>>,
}

impl ProviderLoader {
    pub fn new(bootstrap: EngineBootstrap, artifacts: Arc<ArtifactCache>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                bootstrap,
                artifacts,
                loaded: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn state(&self, network: &NetworkName) -> ProviderState {
        if lock(&self.inner.loaded).contains(network) {
            ProviderState::Loaded
        } else if lock(&self.inner.in_flight).contains_key(network) {
            ProviderState::Loading
        } else {
            ProviderState::NotLoaded
        }
    }

    /// Make sure the engine has a data connection for `network`.
    ///
    /// Returns `false` when the engine is not ready or the connection could not
    /// be opened; the reason is logged.
    pub async fn load_provider(&self, network: &NetworkConfig) -> bool {
        if !self.inner.bootstrap.is_ready() {
            error!(network = %network.name, "cannot load provider: engine not ready");
            return false;
        }

        let load = {
            let mut in_flight = lock(&self.inner.in_flight);
            // Checked under the in-flight lock so a load finishing right now
            // cannot be started twice.
            if lock(&self.inner.loaded).contains(&network.name) {
                return true;
            }
            match in_flight.get(&network.name) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = LoaderInner::load_future(self.inner.clone(), network.clone());
                    in_flight.insert(network.name.clone(), pending.clone());
                    pending
                }
            }
        };

        load.await
    }

    /// Forget every loaded network. Called when the engine shuts down, since
    /// a restarted engine has no data connections.
    pub fn reset(&self) {
        let mut loaded = lock(&self.inner.loaded);
        if !loaded.is_empty() {
            info!(networks = loaded.len(), "provider loads forgotten");
        }
        loaded.clear();
    }
}

impl LoaderInner {
    fn load_future(inner: Arc<Self>, network: NetworkConfig) -> LoadFuture {
        async move {
            let loaded = inner.load(&network).await;
            let mut in_flight = lock(&inner.in_flight);
            if loaded {
                lock(&inner.loaded).insert(network.name.clone());
            }
            in_flight.remove(&network.name);
            loaded
        }
        .boxed()
        .shared()
    }

    async fn load(&self, network: &NetworkConfig) -> bool {
        let report = self.artifacts.ensure_artifacts(network).await;
        if !report.is_complete() {
            warn!(
                network = %network.name,
                failed = report.failed.len(),
                "loading provider with incomplete artifacts"
            );
        }

        let settings = ProviderSettings::for_network(network);
        match self
            .bootstrap
            .engine()
            .load_provider(network, &settings)
            .await
        {
            Ok(()) => {
                info!(network = %network.name, batch_max_count = settings.batch_max_count, "provider loaded");
                true
            }
            Err(err) if err.is_rate_limited() => {
                warn!(network = %network.name, error = %err, "provider load rate limited");
                false
            }
            Err(err) => {
                error!(network = %network.name, error = %err, "provider load failed");
                false
            }
        }
    }
}
