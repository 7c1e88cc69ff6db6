//! Relay doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use shieldswap_relay::{ChainRef, FeeAdvert, RelayChannel, RelayError, RelaySubmission, RelaySwarm, SwarmBroadcast};

use crate::lock;

/// Hash relays report for accepted submissions.
pub const RELAYED_TX_HASH: H256 = H256::repeat_byte(0x7e);

/// Fee advert valid until far in the future.
pub fn advert(relay: &str, fee_token: Address, fee_per_unit_gas: u64) -> FeeAdvert {
    FeeAdvert {
        relay_address: relay.to_string(),
        fee_token,
        fee_per_unit_gas: U256::from(fee_per_unit_gas),
        fees_id: format!("{relay}-fees"),
        fee_rate_scale: U256::one(),
        expires_at: 4_102_444_800,
    }
}

pub struct MockRelayChannel {
    reachable: AtomicBool,
    adverts: Mutex<Vec<FeeAdvert>>,
    reject_with: Mutex<Option<RelayError>>,
    lookups: AtomicUsize,
    submissions: Mutex<Vec<RelaySubmission>>,
}

impl Default for MockRelayChannel {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            adverts: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
            lookups: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

impl MockRelayChannel {
    pub fn with_adverts(adverts: Vec<FeeAdvert>) -> Self {
        let channel = Self::default();
        *lock(&channel.adverts) = adverts;
        channel
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn reject_submissions(&self, err: RelayError) {
        *lock(&self.reject_with) = Some(err);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<RelaySubmission> {
        lock(&self.submissions).clone()
    }
}

#[async_trait]
impl RelayChannel for MockRelayChannel {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<(), RelayError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RelayError::Timeout)
        }
    }

    async fn fee_adverts(&self, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.adverts)
            .iter()
            .filter(|advert| advert.fee_token == fee_token)
            .cloned()
            .collect())
    }

    async fn submit(&self, submission: &RelaySubmission) -> Result<H256, RelayError> {
        if let Some(err) = lock(&self.reject_with).clone() {
            return Err(err);
        }
        lock(&self.submissions).push(submission.clone());
        Ok(RELAYED_TX_HASH)
    }
}

/// In-memory relay swarm.
#[derive(Default)]
pub struct MockSwarm {
    adverts: Mutex<Vec<FeeAdvert>>,
    joined: Mutex<Vec<ChainRef>>,
    broadcasts: Mutex<Vec<SwarmBroadcast>>,
}

impl MockSwarm {
    pub fn with_adverts(adverts: Vec<FeeAdvert>) -> Self {
        let swarm = Self::default();
        *lock(&swarm.adverts) = adverts;
        swarm
    }

    pub fn joined(&self) -> Vec<ChainRef> {
        lock(&self.joined).clone()
    }

    pub fn broadcasts(&self) -> Vec<SwarmBroadcast> {
        lock(&self.broadcasts).clone()
    }
}

#[async_trait]
impl RelaySwarm for MockSwarm {
    async fn start(&self, chain: ChainRef) -> Result<(), RelayError> {
        let mut joined = lock(&self.joined);
        if !joined.contains(&chain) {
            joined.push(chain);
        }
        Ok(())
    }

    async fn fee_adverts(&self, _chain: ChainRef, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError> {
        Ok(lock(&self.adverts)
            .iter()
            .filter(|advert| advert.fee_token == fee_token)
            .cloned()
            .collect())
    }

    async fn broadcast(&self, message: &SwarmBroadcast) -> Result<H256, RelayError> {
        lock(&self.broadcasts).push(message.clone());
        Ok(RELAYED_TX_HASH)
    }
}
