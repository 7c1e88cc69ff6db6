//! Relay selection.
//!
//! Each network is bound to one [`RelayChannel`]: the self-hosted HTTP relay on
//! test networks, the public swarm everywhere else. Quotes are fetched fresh
//! for every transaction attempt and the cheapest unexpired one wins.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, H256, U256};
use shieldswap_common::{NetworkConfig, NetworkName, NetworkRegistry, RelayQuote};
use tracing::{debug, info, warn};

use crate::channel::RelayChannel;
use crate::error::RelayError;
use crate::http::HttpRelayChannel;
use crate::p2p::{P2pRelayChannel, RelaySwarm};
use crate::types::{ChainRef, FeeAdvert, RelaySubmission};

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

pub fn chain_ref(network: &NetworkConfig) -> ChainRef {
    ChainRef {
        chain_type: network.chain_type,
        id: network.chain_id,
    }
}

/// Cheapest advert for `fee_token` that is still valid at `now`.
///
/// Adverts are ranked by `fee_per_unit_gas / fee_rate_scale`, compared by
/// cross-multiplication so no precision is lost.
pub fn cheapest_advert(adverts: Vec<FeeAdvert>, fee_token: Address, now: u64) -> Option<FeeAdvert> {
    adverts
        .into_iter()
        .filter(|advert| advert.fee_token == fee_token && !advert.is_expired(now))
        .min_by(compare_effective_fee)
}

fn compare_effective_fee(a: &FeeAdvert, b: &FeeAdvert) -> Ordering {
    let scale = |advert: &FeeAdvert| {
        if advert.fee_rate_scale.is_zero() {
            U256::one()
        } else {
            advert.fee_rate_scale
        }
    };
    a.fee_per_unit_gas
        .full_mul(scale(b))
        .cmp(&b.fee_per_unit_gas.full_mul(scale(a)))
}

pub struct RelaySelector {
    networks: NetworkRegistry,
    channels: HashMap<NetworkName, Arc<dyn RelayChannel>>,
    lookup_timeout: Duration,
}

impl RelaySelector {
    pub fn new(networks: NetworkRegistry) -> Self {
        Self {
            networks,
            channels: HashMap::new(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Bind every known network to its channel.
    ///
    /// Test networks without a relay URL, and production networks when no
    /// swarm is supplied, are left unbound and report `NoRelayAvailable`.
    pub fn for_networks(
        networks: NetworkRegistry,
        swarm: Option<Arc<dyn RelaySwarm>>,
    ) -> Result<Self, RelayError> {
        let mut selector = Self::new(networks.clone());
        for network in networks.iter() {
            if network.is_test() {
                if let Some(url) = &network.test_relay_url {
                    selector.register(network.name.clone(), Arc::new(HttpRelayChannel::with_url(url.clone())?));
                }
            } else if let Some(swarm) = &swarm {
                selector.register(
                    network.name.clone(),
                    Arc::new(P2pRelayChannel::new(swarm.clone(), chain_ref(network))),
                );
            }
        }
        Ok(selector)
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn register(&mut self, network: NetworkName, channel: Arc<dyn RelayChannel>) {
        self.channels.insert(network, channel);
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    fn channel(&self, network: &NetworkName) -> Result<&Arc<dyn RelayChannel>, RelayError> {
        self.channels
            .get(network)
            .ok_or_else(|| RelayError::NoRelayAvailable(network.to_string()))
    }

    /// Fail fast when relays for `network` cannot be reached.
    pub async fn ensure_connected(&self, network: &NetworkName) -> Result<(), RelayError> {
        let channel = self.channel(network)?;
        match channel.connect().await {
            Ok(()) => {
                debug!(%network, channel = channel.kind(), "relay channel connected");
                Ok(())
            }
            Err(err) => {
                warn!(%network, channel = channel.kind(), error = %err, "relay channel unreachable");
                Err(RelayError::NoRelayAvailable(network.to_string()))
            }
        }
    }

    /// Lowest-fee relay accepting `fee_token` on `network`.
    ///
    /// A native fee token is looked up as the network's wrapped native token.
    pub async fn find_relay(
        &self,
        network: &NetworkName,
        fee_token: Address,
        fee_token_is_native: bool,
    ) -> Option<RelayQuote> {
        let config = match self.networks.get(network) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "relay lookup for unknown network");
                return None;
            }
        };
        let token = if fee_token_is_native {
            config.wrapped_native_token
        } else {
            fee_token
        };

        let channel = match self.channel(network) {
            Ok(channel) => channel,
            Err(err) => {
                debug!(error = %err, "no relay channel bound");
                return None;
            }
        };

        let adverts = match tokio::time::timeout(self.lookup_timeout, channel.fee_adverts(token)).await {
            Ok(Ok(adverts)) => adverts,
            Ok(Err(err)) if err.is_expected_miss() => {
                debug!(%network, error = %err, "no relay found");
                return None;
            }
            Ok(Err(err)) => {
                warn!(%network, error = %err, "relay fee lookup failed");
                return None;
            }
            Err(_) => {
                debug!(%network, "relay fee lookup timed out");
                return None;
            }
        };

        let quote = cheapest_advert(adverts, token, unix_now()).map(FeeAdvert::into_quote);
        match &quote {
            Some(quote) => info!(
                %network,
                relay = %quote.relay_address,
                fee_per_unit_gas = %quote.fee_per_unit_gas,
                "selected relay"
            ),
            None => debug!(%network, token = ?token, "no unexpired relay advert for token"),
        }
        quote
    }

    pub async fn submit(&self, network: &NetworkName, submission: &RelaySubmission) -> Result<H256, RelayError> {
        self.channel(network)?.submit(submission).await
    }
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shieldswap_common::default_networks;

    struct StaticChannel {
        adverts: Result<Vec<FeeAdvert>, RelayError>,
        reachable: bool,
    }

    #[async_trait]
    impl RelayChannel for StaticChannel {
        fn kind(&self) -> &'static str {
            "static"
        }

        async fn connect(&self) -> Result<(), RelayError> {
            if self.reachable {
                Ok(())
            } else {
                Err(RelayError::Timeout)
            }
        }

        async fn fee_adverts(&self, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError> {
            self.adverts.clone().map(|adverts| {
                adverts
                    .into_iter()
                    .filter(|a| a.fee_token == fee_token)
                    .collect()
            })
        }

        async fn submit(&self, _submission: &RelaySubmission) -> Result<H256, RelayError> {
            Ok(H256::zero())
        }
    }

    fn advert(relay: &str, token: Address, fee: u64, expires_at: u64) -> FeeAdvert {
        FeeAdvert {
            relay_address: relay.into(),
            fee_token: token,
            fee_per_unit_gas: U256::from(fee),
            fees_id: format!("{}-fees", relay),
            fee_rate_scale: U256::one(),
            expires_at,
        }
    }

    fn selector_with(channel: StaticChannel) -> RelaySelector {
        let mut selector = RelaySelector::new(default_networks());
        selector.register("ethereum".into(), Arc::new(channel));
        selector
    }

    #[test]
    fn cheapest_skips_expired_and_other_tokens() {
        let usdc = Address::repeat_byte(0xaa);
        let dai = Address::repeat_byte(0xbb);
        let picked = cheapest_advert(
            vec![
                advert("expensive", usdc, 30, 2_000),
                advert("expired", usdc, 1, 500),
                advert("other-token", dai, 2, 2_000),
                advert("cheap", usdc, 10, 2_000),
            ],
            usdc,
            1_000,
        )
        .unwrap();
        assert_eq!(picked.relay_address, "cheap");
    }

    #[test]
    fn cheapest_accounts_for_fee_rate_scale() {
        let usdc = Address::repeat_byte(0xaa);
        // 30 / 10 = 3 per gas beats 5 / 1.
        let scaled = FeeAdvert {
            fee_rate_scale: U256::from(10u64),
            ..advert("scaled", usdc, 30, 2_000)
        };
        let picked = cheapest_advert(vec![advert("flat", usdc, 5, 2_000), scaled], usdc, 1_000).unwrap();
        assert_eq!(picked.relay_address, "scaled");
    }

    #[tokio::test]
    async fn find_relay_returns_lowest_fee_quote() {
        let usdc = Address::repeat_byte(0xaa);
        let far = unix_now() + 3_600;
        let selector = selector_with(StaticChannel {
            adverts: Ok(vec![advert("a", usdc, 12, far), advert("b", usdc, 9, far)]),
            reachable: true,
        });
        let quote = selector.find_relay(&"ethereum".into(), usdc, false).await.unwrap();
        assert_eq!(quote.relay_address, "b");
        assert_eq!(quote.fees_id, "b-fees");
    }

    #[tokio::test]
    async fn native_fee_token_resolves_to_wrapped_token() {
        let weth = default_networks()
            .get(&"ethereum".into())
            .unwrap()
            .wrapped_native_token;
        let selector = selector_with(StaticChannel {
            adverts: Ok(vec![advert("w", weth, 5, unix_now() + 60)]),
            reachable: true,
        });
        let quote = selector
            .find_relay(&"ethereum".into(), Address::zero(), true)
            .await
            .unwrap();
        assert_eq!(quote.fee_token, weth);
    }

    #[tokio::test]
    async fn peer_not_found_is_tolerated() {
        let selector = selector_with(StaticChannel {
            adverts: Err(RelayError::PeerNotFound("none".into())),
            reachable: true,
        });
        assert!(selector
            .find_relay(&"ethereum".into(), Address::repeat_byte(1), false)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn unreachable_channel_means_no_relay() {
        let selector = selector_with(StaticChannel {
            adverts: Ok(vec![]),
            reachable: false,
        });
        assert_eq!(
            selector.ensure_connected(&"ethereum".into()).await,
            Err(RelayError::NoRelayAvailable("ethereum".into()))
        );
        assert_eq!(
            selector.ensure_connected(&"arbitrum".into()).await,
            Err(RelayError::NoRelayAvailable("arbitrum".into()))
        );
    }
}
