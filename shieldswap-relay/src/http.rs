//! HTTP channel to the self-hosted relay used on test networks.

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use reqwest::StatusCode;
use shieldswap_common::RetryPolicy;
use tracing::{debug, info};

use crate::channel::RelayChannel;
use crate::error::RelayError;
use crate::types::{FeeAdvert, RelaySubmission, TestRelayFees, TestRelayResponse, TestRelayTransact};

#[derive(Clone, Debug)]
pub struct HttpRelayConfig {
    pub base_url: String,
    /// Applies to fee lookups and health probes.
    pub timeout: Duration,
    /// Submissions wait for the relay to broadcast.
    pub submit_timeout: Duration,
    /// Fee lookups only; submissions are never retried.
    pub retry: RetryPolicy,
}

impl HttpRelayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(60),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(100),
                ..RetryPolicy::default()
            },
        }
    }
}

pub struct HttpRelayChannel {
    config: HttpRelayConfig,
    http_client: reqwest::Client,
}

impl HttpRelayChannel {
    pub fn new(config: HttpRelayConfig) -> Result<Self, RelayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.submit_timeout.max(config.timeout))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn with_url(base_url: impl Into<String>) -> Result<Self, RelayError> {
        Self::new(HttpRelayConfig::new(base_url))
    }

    async fn fetch_fees(&self) -> Result<TestRelayFees, RelayError> {
        let url = format!("{}/fees", self.config.base_url);
        self.config
            .retry
            .run(RelayError::is_transient, || self.fetch_fees_once(&url))
            .await
    }

    async fn fetch_fees_once(&self, url: &str) -> Result<TestRelayFees, RelayError> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::TOO_MANY_REQUESTS => Err(RelayError::RateLimited),
            StatusCode::NOT_FOUND => Err(RelayError::PeerNotFound(url.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RelayError::InvalidResponse(format!("HTTP {}: {}", status, body)))
            }
        }
    }
}

#[async_trait]
impl RelayChannel for HttpRelayChannel {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn connect(&self) -> Result<(), RelayError> {
        self.fetch_fees().await.map(|_| ())
    }

    async fn fee_adverts(&self, fee_token: Address) -> Result<Vec<FeeAdvert>, RelayError> {
        let adverts: Vec<FeeAdvert> = self
            .fetch_fees()
            .await?
            .adverts()
            .into_iter()
            .filter(|advert| advert.fee_token == fee_token)
            .collect();
        debug!(count = adverts.len(), token = ?fee_token, "test relay fees");
        Ok(adverts)
    }

    /// Not retried: a resend could broadcast twice.
    async fn submit(&self, submission: &RelaySubmission) -> Result<H256, RelayError> {
        let url = format!("{}/transact", self.config.base_url);
        let body = TestRelayTransact::from(submission);

        let response = self
            .http_client
            .post(&url)
            .timeout(self.config.submit_timeout)
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(RelayError::RateLimited);
        }
        // Rejections come back as `{error}` with a non-2xx status, so parse the
        // body regardless of the status code.
        let status = response.status();
        let parsed: TestRelayResponse = response
            .json()
            .await
            .map_err(|e| RelayError::InvalidResponse(format!("HTTP {}: {}", status, e)))?;

        match parsed {
            TestRelayResponse::Accepted { tx_hash } => {
                info!(?tx_hash, "test relay accepted transaction");
                Ok(tx_hash)
            }
            TestRelayResponse::Failed { error } => Err(RelayError::Rejected(error)),
        }
    }
}
