//! Single-flight engine start.
//!
//! ```text
//!   Uninitialized ──ensure_started──► Initializing ──ok──► Ready
//!         ▲                                │
//!         │                                └──err──► Failed ──ensure_started──► Initializing
//!         └────────────── shutdown ─────────────────────┘
//! ```
//!
//! Concurrent callers of [`EngineBootstrap::ensure_started`] await the same
//! in-flight start. A failed start is forgotten so the next call retries.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use shieldswap_artifacts::ArtifactCallbacks;
use shieldswap_common::{RetryPolicy, WalletId};
use tokio::sync::watch;
use tracing::{error, info};

use crate::engine::{EngineStartContext, ProofBackend, ProvingEngine};
use crate::error::EngineError;
use crate::events::EngineEvents;

type StartFuture = Shared<BoxFuture<'static, Result<(), EngineError>>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(EngineError),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineSettings {
    pub datastore_path: PathBuf,
    #[serde(default)]
    pub poi_node_urls: Vec<String>,
    #[serde(default)]
    pub proof_backend: ProofBackend,
    #[serde(default)]
    pub wallet_retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            datastore_path: PathBuf::from("shieldswap-data/engine.db"),
            poi_node_urls: vec!["https://ppoi-agg.horsewithsixlegs.xyz".to_string()],
            proof_backend: ProofBackend::default(),
            wallet_retry: RetryPolicy::default(),
        }
    }
}

/// Owns the engine's lifecycle for the lifetime of the application.
#[derive(Clone)]
pub struct EngineBootstrap {
    inner: Arc<BootstrapInner>,
}

struct BootstrapInner {
    engine: Arc<dyn ProvingEngine>,
    artifacts: Arc<dyn ArtifactCallbacks>,
    settings: EngineSettings,
    events: EngineEvents,
    state: watch::Sender<EngineState>,
    in_flight: Mutex<Option<StartFuture>>,
}

impl EngineBootstrap {
    pub fn new(
        engine: Arc<dyn ProvingEngine>,
        artifacts: Arc<dyn ArtifactCallbacks>,
        settings: EngineSettings,
        events: EngineEvents,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            inner: Arc::new(BootstrapInner {
                engine,
                artifacts,
                settings,
                events,
                state,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ProvingEngine> {
        &self.inner.engine
    }

    pub fn events(&self) -> &EngineEvents {
        &self.inner.events
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.state.borrow(), EngineState::Ready)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// Start the engine, or join a start already in progress.
    pub async fn ensure_started(&self) -> Result<(), EngineError> {
        if self.is_ready() {
            return Ok(());
        }
        if self.inner.engine.is_started() {
            info!("engine already running, adopting it");
            self.inner.state.send_replace(EngineState::Ready);
            return Ok(());
        }

        let start = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = BootstrapInner::start_future(self.inner.clone());
                    self.inner.state.send_replace(EngineState::Initializing);
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        start.await
    }

    /// Resolve once the engine is ready. Fails if a start attempt fails.
    pub async fn wait_ready(&self) -> Result<(), EngineError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|state| matches!(state, EngineState::Ready | EngineState::Failed(_)))
            .await
            .map_err(|_| EngineError::NotStarted)?
            .clone();
        match state {
            EngineState::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }

    /// Load a wallet, retrying only errors the engine marks as transient.
    pub async fn load_wallet(&self, wallet: &WalletId, encryption_key: &str) -> Result<(), EngineError> {
        if !self.is_ready() {
            return Err(EngineError::NotStarted);
        }
        let engine = &self.inner.engine;
        self.inner
            .settings
            .wallet_retry
            .run(EngineError::is_transient, || engine.load_wallet(wallet, encryption_key))
            .await?;
        info!(%wallet, "wallet loaded");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        lock(&self.inner.in_flight).take();
        let result = self.inner.engine.shutdown().await;
        self.inner.state.send_replace(EngineState::Uninitialized);
        info!("engine shut down");
        result
    }
}

impl BootstrapInner {
    fn start_future(inner: Arc<Self>) -> StartFuture {
        async move {
            info!(datastore = %inner.settings.datastore_path.display(), "starting engine");
            let result = inner.start_engine().await;
            match &result {
                Ok(()) => {
                    inner.state.send_replace(EngineState::Ready);
                    info!("engine ready");
                }
                Err(err) => {
                    inner.state.send_replace(EngineState::Failed(err.clone()));
                    error!(error = %err, "engine start failed");
                }
            }
            lock(&inner.in_flight).take();
            result
        }
        .boxed()
        .shared()
    }

    async fn start_engine(&self) -> Result<(), EngineError> {
        let ctx = EngineStartContext {
            datastore_path: self.settings.datastore_path.clone(),
            artifacts: self.artifacts.clone(),
            poi_node_urls: self.settings.poi_node_urls.clone(),
            events: self.events.clone(),
        };
        self.engine.start(ctx).await?;
        self.engine
            .register_proof_backend(self.settings.proof_backend)
            .await?;
        Ok(())
    }
}

/// The guarded sections never panic, so a poisoned lock still holds a
/// consistent value.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
