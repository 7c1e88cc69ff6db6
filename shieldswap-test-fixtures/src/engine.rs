//! Scriptable in-memory proving engine.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::json;
use shieldswap_common::{NetworkConfig, NetworkName, ShieldedBalanceInfo, WalletId};
use shieldswap_engine::{
    EngineError, EngineStartContext, GasDetails, PopulatedTransaction, ProofBackend, ProofRequest,
    ProviderSettings, ProvingEngine, RawTransaction, ShieldRequest,
};
use tokio::sync::mpsc;

use crate::lock;

/// Gas every estimate returns unless overridden.
pub const DEFAULT_GAS_ESTIMATE: u64 = 500_000;

/// Contract the populated transactions call.
pub const POOL_CONTRACT: Address = Address::repeat_byte(0x5a);

/// Counts every call and fails on demand.
///
/// Failures are queued: each `fail_next_*` makes exactly one upcoming call
/// fail, in order.
pub struct MockEngine {
    started: AtomicBool,
    start_calls: AtomicUsize,
    start_delay: Mutex<Duration>,
    start_failures: Mutex<VecDeque<EngineError>>,
    backends: Mutex<Vec<ProofBackend>>,

    provider_calls: AtomicUsize,
    provider_delay: Mutex<Duration>,
    provider_failures: Mutex<VecDeque<EngineError>>,
    provider_settings: Mutex<Vec<ProviderSettings>>,

    wallet_calls: AtomicUsize,
    wallet_failures: Mutex<VecDeque<EngineError>>,

    refresh_calls: AtomicUsize,
    refresh_delay: Mutex<Duration>,
    refresh_failures: Mutex<VecDeque<EngineError>>,
    scanned: Mutex<Vec<Vec<WalletId>>>,

    balances: Mutex<HashMap<(WalletId, Address), ShieldedBalanceInfo>>,
    gas_estimate: Mutex<U256>,

    proof_calls: AtomicUsize,
    proof_progress: Mutex<Vec<f64>>,
    proof_failure: Mutex<Option<EngineError>>,
    nullifiers: Mutex<Vec<H256>>,

    estimated: Mutex<Vec<ProofRequest>>,
    proved: Mutex<Vec<ProofRequest>>,
    shields: Mutex<Vec<ShieldRequest>>,
    shutdowns: AtomicUsize,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            started: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            start_delay: Mutex::new(Duration::ZERO),
            start_failures: Mutex::new(VecDeque::new()),
            backends: Mutex::new(Vec::new()),
            provider_calls: AtomicUsize::new(0),
            provider_delay: Mutex::new(Duration::ZERO),
            provider_failures: Mutex::new(VecDeque::new()),
            provider_settings: Mutex::new(Vec::new()),
            wallet_calls: AtomicUsize::new(0),
            wallet_failures: Mutex::new(VecDeque::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_failures: Mutex::new(VecDeque::new()),
            scanned: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            gas_estimate: Mutex::new(U256::from(DEFAULT_GAS_ESTIMATE)),
            proof_calls: AtomicUsize::new(0),
            proof_progress: Mutex::new(vec![25.0, 50.0, 75.0, 100.0]),
            proof_failure: Mutex::new(None),
            nullifiers: Mutex::new(vec![H256::repeat_byte(0x0a)]),
            estimated: Mutex::new(Vec::new()),
            proved: Mutex::new(Vec::new()),
            shields: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine some other owner already started.
    pub fn already_started() -> Self {
        let engine = Self::default();
        engine.started.store(true, Ordering::SeqCst);
        engine
    }

    // ─── scripting ───────────────────────────────────────────────────────────

    pub fn set_start_delay(&self, delay: Duration) {
        *lock(&self.start_delay) = delay;
    }

    pub fn fail_next_start(&self, err: EngineError) {
        lock(&self.start_failures).push_back(err);
    }

    pub fn set_provider_delay(&self, delay: Duration) {
        *lock(&self.provider_delay) = delay;
    }

    pub fn fail_next_provider_load(&self, err: EngineError) {
        lock(&self.provider_failures).push_back(err);
    }

    pub fn fail_next_wallet_load(&self, err: EngineError) {
        lock(&self.wallet_failures).push_back(err);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *lock(&self.refresh_delay) = delay;
    }

    pub fn fail_next_refresh(&self, err: EngineError) {
        lock(&self.refresh_failures).push_back(err);
    }

    pub fn set_balance(&self, wallet: &WalletId, token: Address, total: U256, spendable: U256) {
        lock(&self.balances).insert(
            (wallet.clone(), token),
            ShieldedBalanceInfo::new(total, spendable),
        );
    }

    pub fn set_gas_estimate(&self, gas: U256) {
        *lock(&self.gas_estimate) = gas;
    }

    /// Values reported on the progress channel during proving, 0–100.
    pub fn set_proof_progress(&self, steps: Vec<f64>) {
        *lock(&self.proof_progress) = steps;
    }

    pub fn fail_proof(&self, err: EngineError) {
        *lock(&self.proof_failure) = Some(err);
    }

    pub fn set_nullifiers(&self, nullifiers: Vec<H256>) {
        *lock(&self.nullifiers) = nullifiers;
    }

    // ─── observation ─────────────────────────────────────────────────────────

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn backends(&self) -> Vec<ProofBackend> {
        lock(&self.backends).clone()
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::SeqCst)
    }

    pub fn provider_settings(&self) -> Vec<ProviderSettings> {
        lock(&self.provider_settings).clone()
    }

    pub fn wallet_calls(&self) -> usize {
        self.wallet_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Wallet set of every balance scan, in call order.
    pub fn scanned_wallets(&self) -> Vec<Vec<WalletId>> {
        lock(&self.scanned).clone()
    }

    pub fn proof_calls(&self) -> usize {
        self.proof_calls.load(Ordering::SeqCst)
    }

    /// Drafts passed to the unproven gas estimate.
    pub fn estimated_requests(&self) -> Vec<ProofRequest> {
        lock(&self.estimated).clone()
    }

    /// Requests passed to proof generation.
    pub fn proved_requests(&self) -> Vec<ProofRequest> {
        lock(&self.proved).clone()
    }

    pub fn shield_requests(&self) -> Vec<ShieldRequest> {
        lock(&self.shields).clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn gas(&self) -> U256 {
        *lock(&self.gas_estimate)
    }
}

async fn pause(delay: &Mutex<Duration>) {
    let delay = *lock(delay);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl ProvingEngine for MockEngine {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn start(&self, _ctx: EngineStartContext) -> Result<(), EngineError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        pause(&self.start_delay).await;
        if let Some(err) = lock(&self.start_failures).pop_front() {
            return Err(err);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn register_proof_backend(&self, backend: ProofBackend) -> Result<(), EngineError> {
        lock(&self.backends).push(backend);
        Ok(())
    }

    async fn load_provider(
        &self,
        _network: &NetworkConfig,
        settings: &ProviderSettings,
    ) -> Result<(), EngineError> {
        self.provider_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.provider_settings).push(settings.clone());
        pause(&self.provider_delay).await;
        match lock(&self.provider_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn load_wallet(&self, _wallet: &WalletId, _encryption_key: &str) -> Result<(), EngineError> {
        self.wallet_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.wallet_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn refresh_balances(
        &self,
        _network: &NetworkName,
        wallets: &[WalletId],
    ) -> Result<(), EngineError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.scanned).push(wallets.to_vec());
        pause(&self.refresh_delay).await;
        match lock(&self.refresh_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn balance_for_token(
        &self,
        wallet: &WalletId,
        _network: &NetworkName,
        token: Address,
        only_spendable: bool,
    ) -> Result<U256, EngineError> {
        let info = lock(&self.balances)
            .get(&(wallet.clone(), token))
            .copied()
            .unwrap_or_default();
        Ok(if only_spendable { info.spendable } else { info.total })
    }

    async fn gas_estimate_for_unproven(
        &self,
        request: &ProofRequest,
        _gas: &GasDetails,
    ) -> Result<U256, EngineError> {
        lock(&self.estimated).push(request.clone());
        Ok(self.gas())
    }

    async fn generate_proof(
        &self,
        request: &ProofRequest,
        progress: mpsc::UnboundedSender<f64>,
    ) -> Result<(), EngineError> {
        self.proof_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.proved).push(request.clone());
        let steps = lock(&self.proof_progress).clone();
        for step in steps {
            let _ = progress.send(step);
            tokio::task::yield_now().await;
        }
        match lock(&self.proof_failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn populate_proved(
        &self,
        _request: &ProofRequest,
        _gas: &GasDetails,
    ) -> Result<PopulatedTransaction, EngineError> {
        Ok(PopulatedTransaction {
            transaction: RawTransaction {
                to: POOL_CONTRACT,
                data: Bytes::from(vec![0xd0, 0x0d]),
                value: U256::zero(),
            },
            nullifiers: lock(&self.nullifiers).clone(),
            poi_proofs: json!({ "listKey": "default" }),
        })
    }

    async fn gas_estimate_for_shield(&self, request: &ShieldRequest) -> Result<U256, EngineError> {
        lock(&self.shields).push(request.clone());
        Ok(self.gas())
    }

    async fn populate_shield(
        &self,
        _request: &ShieldRequest,
        _gas: &GasDetails,
    ) -> Result<RawTransaction, EngineError> {
        Ok(RawTransaction {
            to: POOL_CONTRACT,
            data: Bytes::from(vec![0x5e, 0x1d]),
            value: U256::zero(),
        })
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
