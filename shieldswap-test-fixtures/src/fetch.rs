//! Gateway double serving well-formed artifacts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use shieldswap_artifacts::{ArtifactFetcher, FetchError};

static BODIES: Lazy<Vec<(&'static str, Vec<u8>)>> = Lazy::new(|| {
    vec![
        (
            "vkey.json",
            br#"{"protocol":"groth16","vk_alpha_1":["1","2","1"]}"#.to_vec(),
        ),
        ("zkey.br", b"zkey-fixture-proving-key".to_vec()),
        ("wasm.br", b"\0asm-fixture-witness".to_vec()),
    ]
});

/// Serves a valid body for every artifact path and counts requests.
#[derive(Default)]
pub struct MockFetcher {
    requests: AtomicUsize,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each request takes `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            requests: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        BODIES
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix))
            .map(|(_, body)| body.clone())
            .ok_or(FetchError::Status(404))
    }
}
