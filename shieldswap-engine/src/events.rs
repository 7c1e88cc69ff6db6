//! Engine event sinks.
//!
//! The engine publishes balance updates and merkle-scan progress; any number
//! of subscribers can listen. Publishing with no subscribers is not an error.

use ethers::types::Address;
use serde::Serialize;
use shieldswap_common::{NetworkName, ShieldedBalanceInfo, WalletId};
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub token: Address,
    pub balance: ShieldedBalanceInfo,
}

/// New balances for one wallet on one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceUpdate {
    pub network: NetworkName,
    pub wallet: WalletId,
    pub balances: Vec<TokenBalance>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Started,
    Updated,
    Complete,
    Incomplete,
}

/// Progress of the commitment-log scan for one network.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MerkleScanProgress {
    pub network: NetworkName,
    pub status: ScanStatus,
    /// 0.0 – 1.0
    pub progress: f64,
}

#[derive(Clone, Debug)]
pub struct EngineEvents {
    balances: broadcast::Sender<BalanceUpdate>,
    scans: broadcast::Sender<MerkleScanProgress>,
}

impl Default for EngineEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EngineEvents {
    pub fn new(capacity: usize) -> Self {
        let (balances, _) = broadcast::channel(capacity.max(1));
        let (scans, _) = broadcast::channel(capacity.max(1));
        Self { balances, scans }
    }

    pub fn subscribe_balances(&self) -> broadcast::Receiver<BalanceUpdate> {
        self.balances.subscribe()
    }

    pub fn subscribe_scans(&self) -> broadcast::Receiver<MerkleScanProgress> {
        self.scans.subscribe()
    }

    /// Returns the number of subscribers reached.
    pub fn publish_balance(&self, update: BalanceUpdate) -> usize {
        self.balances.send(update).unwrap_or(0)
    }

    pub fn publish_scan(&self, progress: MerkleScanProgress) -> usize {
        self.scans.send(progress).unwrap_or(0)
    }
}
