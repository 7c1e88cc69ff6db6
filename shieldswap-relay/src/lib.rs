//! Relay discovery and submission.
//!
//! Spending from a shielded balance needs a relay to pay gas. This crate finds
//! the cheapest relay that accepts a given fee token and hands it proven
//! transactions, over HTTP to a self-hosted relay on test networks or through
//! the public relay swarm on production networks.

pub mod channel;
pub mod error;
pub mod http;
pub mod p2p;
pub mod selector;
pub mod types;

pub use channel::RelayChannel;
pub use error::RelayError;
pub use http::{HttpRelayChannel, HttpRelayConfig};
pub use p2p::{P2pRelayChannel, RelaySwarm};
pub use selector::{chain_ref, cheapest_advert, RelaySelector};
pub use types::{
    ChainRef, FeeAdvert, RelaySubmission, SwarmBroadcast, TestRelayFees, TestRelayResponse,
    TestRelayTransact,
};
