//! Channel to the public relay swarm used on production networks.
//!
//! The swarm client itself (peer discovery, gossip, encryption) is injected
//! behind [`RelaySwarm`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use tracing::{debug, info};

use crate::channel::RelayChannel;
use crate::error::RelayError;
use crate::types::{ChainRef, FeeAdvert, RelaySubmission, SwarmBroadcast};

#[async_trait]
pub trait RelaySwarm: Send + Sync {
    /// Join the swarm topic for `chain`. Idempotent.
    async fn start(&self, chain: ChainRef) -> Result<(), RelayError>;

    async fn fee_adverts(&self, chain: ChainRef, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError>;

    async fn broadcast(&self, message: &SwarmBroadcast) -> Result<H256, RelayError>;
}

pub struct P2pRelayChannel {
    swarm: Arc<dyn RelaySwarm>,
    chain: ChainRef,
    connect_timeout: Duration,
}

impl P2pRelayChannel {
    pub fn new(swarm: Arc<dyn RelaySwarm>, chain: ChainRef) -> Self {
        Self {
            swarm,
            chain,
            connect_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl RelayChannel for P2pRelayChannel {
    fn kind(&self) -> &'static str {
        "p2p"
    }

    async fn connect(&self) -> Result<(), RelayError> {
        tokio::time::timeout(self.connect_timeout, self.swarm.start(self.chain))
            .await
            .map_err(|_| RelayError::Timeout)??;
        debug!(chain_id = self.chain.id, "relay swarm connected");
        Ok(())
    }

    async fn fee_adverts(&self, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError> {
        self.swarm.fee_adverts(self.chain, fee_token).await
    }

    async fn submit(&self, submission: &RelaySubmission) -> Result<H256, RelayError> {
        let message = SwarmBroadcast::from(submission);
        let tx_hash = self.swarm.broadcast(&message).await?;
        info!(?tx_hash, relay = %submission.relay_address, "relay broadcast transaction");
        Ok(tx_hash)
    }
}
