use async_trait::async_trait;
use ethers::types::{Address, H256};

use crate::error::RelayError;
use crate::types::{FeeAdvert, RelaySubmission};

/// One way of reaching relays for a network.
#[async_trait]
pub trait RelayChannel: Send + Sync {
    /// Short name for logs.
    fn kind(&self) -> &'static str;

    async fn connect(&self) -> Result<(), RelayError>;

    /// Current fee adverts for `fee_token`; may include expired ones.
    async fn fee_adverts(&self, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError>;

    /// Hand a proven transaction to a relay; returns the public tx hash.
    async fn submit(&self, submission: &RelaySubmission) -> Result<H256, RelayError>;
}
