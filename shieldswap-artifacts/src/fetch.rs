//! Gateway fetching.

use std::time::Duration;

use async_trait::async_trait;
use shieldswap_common::DistributionSource;
use tracing::{debug, warn};

use crate::error::{ArtifactError, FetchError};

/// Plain GET of a URL with a per-request timeout.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed fetcher.
#[derive(Clone, Debug, Default)]
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
}

impl HttpArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(classify_reqwest)?;
        Ok(bytes.to_vec())
    }
}

fn classify_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// `{gateway}/ipfs/{hash}/{path}`
pub fn gateway_url(gateway: &str, content_hash: &str, path: &str) -> String {
    format!(
        "{}/ipfs/{}/{}",
        gateway.trim_end_matches('/'),
        content_hash,
        path.trim_start_matches('/')
    )
}

/// Try each gateway in priority order; the first success wins.
pub async fn fetch_from_gateways(
    fetcher: &dyn ArtifactFetcher,
    source: &DistributionSource,
    path: &str,
    timeout: Duration,
) -> Result<Vec<u8>, ArtifactError> {
    let mut last = FetchError::Transport("no gateways configured".to_string());

    for gateway in &source.gateways {
        let url = gateway_url(gateway, &source.content_hash, path);
        match fetcher.fetch(&url, timeout).await {
            Ok(bytes) => {
                debug!(%url, size = bytes.len(), "fetched artifact");
                return Ok(bytes);
            }
            Err(err) => {
                warn!(%url, error = %err, "gateway failed, trying next");
                last = err;
            }
        }
    }

    Err(ArtifactError::AllGatewaysFailed {
        path: path.to_string(),
        attempts: source.gateways.len(),
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedFetcher {
        failing_hosts: Vec<&'static str>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            if self.failing_hosts.iter().any(|host| url.contains(host)) {
                Err(FetchError::Status(502))
            } else {
                Ok(b"payload".to_vec())
            }
        }
    }

    fn source() -> DistributionSource {
        DistributionSource {
            content_hash: "QmHash".into(),
            gateways: vec![
                "https://first.example/".into(),
                "https://second.example".into(),
                "https://third.example".into(),
            ],
        }
    }

    #[test]
    fn gateway_url_joins_cleanly() {
        assert_eq!(
            gateway_url("https://g.example/", "QmHash", "/01x01/vkey.json"),
            "https://g.example/ipfs/QmHash/01x01/vkey.json"
        );
    }

    #[tokio::test]
    async fn falls_back_to_next_gateway() {
        let fetcher = ScriptedFetcher {
            failing_hosts: vec!["first.example"],
            requested: Mutex::new(vec![]),
        };
        let bytes = fetch_from_gateways(&fetcher, &source(), "01x01/vkey.json", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(bytes, b"payload");

        let requested = fetcher.requested.lock().unwrap();
        assert_eq!(requested.len(), 2);
        assert!(requested[1].starts_with("https://second.example/ipfs/QmHash/"));
    }

    #[tokio::test]
    async fn reports_when_every_gateway_fails() {
        let fetcher = ScriptedFetcher {
            failing_hosts: vec!["first.example", "second.example", "third.example"],
            requested: Mutex::new(vec![]),
        };
        let err = fetch_from_gateways(&fetcher, &source(), "x", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ArtifactError::AllGatewaysFailed {
                path: "x".into(),
                attempts: 3,
                last: FetchError::Status(502),
            }
        );
    }
}
