//! Shielded balance synchronisation.
//!
//! Refreshes scan the commitment log, which is slow and hits the RPC hard.
//! Unforced refreshes inside `min_interval` of the last one are skipped, and
//! overlapping refreshes of the same network share one scan when it covers
//! their wallets. A forced refresh never joins a scan that was already running
//! when it was requested: it waits for that scan and then starts its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ethers::types::{Address, U256};
use futures::future::{BoxFuture, FutureExt, Shared};
use shieldswap_common::{NetworkName, RetryPolicy, ShieldedBalanceInfo, WalletId};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bootstrap::lock;
use crate::engine::ProvingEngine;
use crate::error::EngineError;
use crate::events::{BalanceUpdate, EngineEvents};

type RefreshFuture = Shared<BoxFuture<'static, Result<(), EngineError>>>;
type BalanceKey = (NetworkName, WalletId, Address);

pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Joined a refresh another caller had already started.
    Joined,
    /// Skipped: the last refresh is recent enough.
    Throttled,
}

struct InFlightScan {
    generation: u64,
    wallets: Vec<WalletId>,
    future: RefreshFuture,
}

impl InFlightScan {
    fn covers(&self, wallets: &[WalletId]) -> bool {
        wallets.iter().all(|wallet| self.wallets.contains(wallet))
    }
}

enum RefreshStep {
    Join(RefreshFuture),
    Wait(RefreshFuture),
    Start(RefreshFuture),
}

#[derive(Clone)]
pub struct BalanceSynchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    engine: Arc<dyn ProvingEngine>,
    retry: RetryPolicy,
    min_interval: Duration,
    last_refresh: Mutex<HashMap<NetworkName, Instant>>,
    next_generation: AtomicU64,
    in_flight: Mutex<HashMap<NetworkName, InFlightScan>>,
    balances: Mutex<HashMap<BalanceKey, ShieldedBalanceInfo>>,
}

impl BalanceSynchronizer {
    pub fn new(engine: Arc<dyn ProvingEngine>, retry: RetryPolicy, min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                engine,
                retry,
                min_interval,
                last_refresh: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
                balances: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Rescan `network` for `wallets`.
    pub async fn refresh(
        &self,
        network: &NetworkName,
        wallets: &[WalletId],
        force: bool,
    ) -> Result<RefreshOutcome, EngineError> {
        // Scans numbered below this started before the call and are stale for
        // a forced refresh.
        let fresh_from = if force {
            self.inner.next_generation.load(Ordering::SeqCst)
        } else {
            0
        };
        let mut skip_throttle = force;

        loop {
            let step = {
                let mut in_flight = lock(&self.inner.in_flight);
                match in_flight.get(network) {
                    Some(scan) if scan.generation >= fresh_from && scan.covers(wallets) => {
                        RefreshStep::Join(scan.future.clone())
                    }
                    Some(scan) => RefreshStep::Wait(scan.future.clone()),
                    None => {
                        if !skip_throttle && self.inner.recently_refreshed(network) {
                            debug!(%network, "balance refresh throttled");
                            return Ok(RefreshOutcome::Throttled);
                        }
                        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
                        let future = SyncInner::refresh_future(
                            self.inner.clone(),
                            network.clone(),
                            wallets.to_vec(),
                            generation,
                        );
                        in_flight.insert(
                            network.clone(),
                            InFlightScan {
                                generation,
                                wallets: wallets.to_vec(),
                                future: future.clone(),
                            },
                        );
                        RefreshStep::Start(future)
                    }
                }
            };

            match step {
                RefreshStep::Join(pending) => {
                    pending.await?;
                    return Ok(RefreshOutcome::Joined);
                }
                RefreshStep::Start(pending) => {
                    pending.await?;
                    return Ok(RefreshOutcome::Refreshed);
                }
                RefreshStep::Wait(stale) => {
                    debug!(%network, "waiting for running balance scan before rescanning");
                    // Its outcome belongs to whoever started it.
                    let _ = stale.await;
                    skip_throttle = true;
                }
            }
        }
    }

    /// Query the engine for the balance of one token and remember it.
    pub async fn balance(
        &self,
        network: &NetworkName,
        wallet: &WalletId,
        token: Address,
    ) -> Result<ShieldedBalanceInfo, EngineError> {
        let engine = &self.inner.engine;
        let total = engine.balance_for_token(wallet, network, token, false).await?;
        let spendable = engine.balance_for_token(wallet, network, token, true).await?;
        let info = ShieldedBalanceInfo::new(total, spendable);
        lock(&self.inner.balances).insert((network.clone(), wallet.clone(), token), info);
        Ok(info)
    }

    /// Spendable amount only; what fee validation needs.
    pub async fn spendable(
        &self,
        network: &NetworkName,
        wallet: &WalletId,
        token: Address,
    ) -> Result<U256, EngineError> {
        self.inner
            .engine
            .balance_for_token(wallet, network, token, true)
            .await
    }

    pub fn cached(
        &self,
        network: &NetworkName,
        wallet: &WalletId,
        token: Address,
    ) -> Option<ShieldedBalanceInfo> {
        lock(&self.inner.balances)
            .get(&(network.clone(), wallet.clone(), token))
            .copied()
    }

    pub fn apply_update(&self, update: &BalanceUpdate) {
        let mut balances = lock(&self.inner.balances);
        for entry in &update.balances {
            balances.insert(
                (update.network.clone(), update.wallet.clone(), entry.token),
                entry.balance,
            );
        }
    }

    /// Keep the cache current from the engine's balance-update stream.
    pub fn spawn_listener(&self, events: &EngineEvents) -> JoinHandle<()> {
        let mut rx = events.subscribe_balances();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(update) => this.apply_update(&update),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "balance listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl SyncInner {
    fn recently_refreshed(&self, network: &NetworkName) -> bool {
        lock(&self.last_refresh)
            .get(network)
            .is_some_and(|last| last.elapsed() < self.min_interval)
    }

    fn refresh_future(
        inner: Arc<Self>,
        network: NetworkName,
        wallets: Vec<WalletId>,
        generation: u64,
    ) -> RefreshFuture {
        async move {
            let started = Instant::now();
            let result = inner
                .retry
                .run(EngineError::is_transient, || {
                    inner.engine.refresh_balances(&network, &wallets)
                })
                .await;

            let mut in_flight = lock(&inner.in_flight);
            match &result {
                Ok(()) => {
                    lock(&inner.last_refresh).insert(network.clone(), Instant::now());
                    info!(%network, elapsed_ms = started.elapsed().as_millis() as u64, "balances refreshed");
                }
                Err(err) => warn!(%network, error = %err, "balance refresh failed"),
            }
            if in_flight.get(&network).map(|scan| scan.generation) == Some(generation) {
                in_flight.remove(&network);
            }
            result
        }
        .boxed()
        .shared()
    }
}
