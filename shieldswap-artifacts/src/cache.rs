//! The artifact cache manager.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use shieldswap_common::{DistributionSource, NetworkConfig, NetworkName, PoiArtifactConfig};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ArtifactError;
use crate::fetch::{fetch_from_gateways, ArtifactFetcher};
use crate::store::ArtifactStore;
use crate::variant::{
    has_expected_header, storage_key, validate_structure, ArtifactKind, ArtifactVariant,
    CachedArtifact,
};

/// Bump when the layout of stored entries changes.
pub const CACHE_SCHEMA_VERSION: u32 = 2;
pub const VERSION_KEY: &str = "artifact-cache/version";

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Storage callbacks handed to the proving engine at start.
#[async_trait]
pub trait ArtifactCallbacks: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, ArtifactError>;
    async fn store(&self, path: &str, bytes: &[u8]) -> Result<(), ArtifactError>;
    async fn exists(&self, path: &str) -> Result<bool, ArtifactError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchedArtifact {
    pub key: String,
    pub size: usize,
    pub blake3: String,
    /// The entry replaced a corrupt one.
    pub repaired: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of one priming pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub network: NetworkName,
    /// Entries that were already present and valid.
    pub present: usize,
    /// Transact variants served by the engine's bundled artifacts.
    pub bundled_variants: usize,
    pub fetched: Vec<FetchedArtifact>,
    pub failed: Vec<ArtifactFailure>,
}

impl ArtifactReport {
    fn new(network: NetworkName) -> Self {
        Self {
            network,
            present: 0,
            bundled_variants: 0,
            fetched: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.len()
    }
}

enum EntryState {
    Valid,
    Missing,
    Corrupt(String),
}

/// Network-aware artifact cache.
pub struct ArtifactCache {
    store: ArtifactStore,
    fetcher: Arc<dyn ArtifactFetcher>,
    poi: PoiArtifactConfig,
    priming: Mutex<()>,
}

impl ArtifactCache {
    pub fn new(store: ArtifactStore, fetcher: Arc<dyn ArtifactFetcher>, poi: PoiArtifactConfig) -> Self {
        Self {
            store,
            fetcher,
            poi,
            priming: Mutex::new(()),
        }
    }

    pub fn backing_store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Make sure every artifact `network` needs is present and sound.
    ///
    /// Never fails: problems are logged and listed in the report, and proof
    /// generation for an affected circuit fails later with its own error.
    pub async fn ensure_artifacts(&self, network: &NetworkConfig) -> ArtifactReport {
        let _guard = self.priming.lock().await;
        let mut report = ArtifactReport::new(network.name.clone());

        if let Err(err) = self.ensure_schema() {
            warn!(network = %network.name, error = %err, "artifact cache schema check failed");
            report.failed.push(ArtifactFailure {
                key: VERSION_KEY.to_string(),
                reason: err.to_string(),
            });
            return report;
        }

        let profile = &network.artifacts;
        let transact: Vec<ArtifactVariant> = profile
            .shapes
            .iter()
            .copied()
            .map(ArtifactVariant::transact)
            .collect();

        if profile.requires_custom_artifacts {
            match &profile.distribution {
                Some(source) => {
                    self.prime_variants(&profile.storage_prefix, &transact, source, &mut report)
                        .await
                }
                None => {
                    let err = ArtifactError::NoDistribution(network.name.to_string());
                    warn!(network = %network.name, "{}", err);
                    report.failed.push(ArtifactFailure {
                        key: profile.storage_prefix.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        } else {
            report.bundled_variants = transact.len();
        }

        if profile.include_poi {
            let poi: Vec<ArtifactVariant> = self
                .poi
                .shapes
                .iter()
                .copied()
                .map(ArtifactVariant::poi)
                .collect();
            let source = self.poi.distribution.clone();
            self.prime_variants(&profile.storage_prefix, &poi, &source, &mut report)
                .await;
        }

        if report.fetch_count() > 0 || !report.is_complete() {
            info!(
                network = %network.name,
                present = report.present,
                fetched = report.fetch_count(),
                failed = report.failed.len(),
                "artifact cache primed"
            );
        } else {
            debug!(network = %network.name, present = report.present, "artifact cache already warm");
        }

        report
    }

    /// Read one entry, treating a structurally invalid entry as absent.
    pub fn read(
        &self,
        prefix: &str,
        variant: &ArtifactVariant,
        kind: ArtifactKind,
    ) -> Result<Option<CachedArtifact>, ArtifactError> {
        let key = storage_key(prefix, variant, kind);
        match self.store.get(&key)? {
            Some(bytes) => match CachedArtifact::decode(key, kind, bytes) {
                Ok(artifact) => Ok(Some(artifact)),
                Err(err) => {
                    debug!(error = %err, "ignoring malformed artifact entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn ensure_schema(&self) -> Result<(), ArtifactError> {
        let current = CACHE_SCHEMA_VERSION.to_string();
        match self.store.get(VERSION_KEY)? {
            Some(stored) if stored == current.as_bytes() => Ok(()),
            Some(stored) => {
                warn!(
                    stored = %String::from_utf8_lossy(&stored),
                    expected = CACHE_SCHEMA_VERSION,
                    "artifact cache schema changed, discarding all entries"
                );
                self.store.clear()?;
                self.store.put(VERSION_KEY, current.as_bytes())
            }
            None => self.store.put(VERSION_KEY, current.as_bytes()),
        }
    }

    async fn prime_variants(
        &self,
        prefix: &str,
        variants: &[ArtifactVariant],
        source: &DistributionSource,
        report: &mut ArtifactReport,
    ) {
        for variant in variants {
            for kind in ArtifactKind::ALL {
                let key = storage_key(prefix, variant, kind);
                let repaired = match self.entry_state(&key, kind) {
                    Ok(EntryState::Valid) => {
                        report.present += 1;
                        continue;
                    }
                    Ok(EntryState::Missing) => false,
                    Ok(EntryState::Corrupt(reason)) => {
                        warn!(%key, %reason, "discarding corrupt artifact");
                        if let Err(err) = self.store.remove(&key) {
                            report.failed.push(ArtifactFailure {
                                key,
                                reason: err.to_string(),
                            });
                            continue;
                        }
                        true
                    }
                    Err(err) => {
                        report.failed.push(ArtifactFailure {
                            key,
                            reason: err.to_string(),
                        });
                        continue;
                    }
                };

                match self.fetch_entry(&key, variant, kind, source).await {
                    Ok(size_and_hash) => report.fetched.push(FetchedArtifact {
                        key,
                        size: size_and_hash.0,
                        blake3: size_and_hash.1,
                        repaired,
                    }),
                    Err(err) => {
                        warn!(%key, error = %err, "artifact unavailable, circuit left unusable");
                        report.failed.push(ArtifactFailure {
                            key,
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn entry_state(&self, key: &str, kind: ArtifactKind) -> Result<EntryState, ArtifactError> {
        match self.store.get(key)? {
            None => Ok(EntryState::Missing),
            Some(bytes) => match validate_structure(key, kind, &bytes) {
                Ok(()) => Ok(EntryState::Valid),
                Err(err) => Ok(EntryState::Corrupt(err.to_string())),
            },
        }
    }

    async fn fetch_entry(
        &self,
        key: &str,
        variant: &ArtifactVariant,
        kind: ArtifactKind,
        source: &DistributionSource,
    ) -> Result<(usize, String), ArtifactError> {
        let path = variant.distribution_path(kind);
        let raw = fetch_from_gateways(self.fetcher.as_ref(), source, &path, kind.fetch_timeout()).await?;
        let bytes = decode_payload(&path, kind, raw)?;
        validate_structure(key, kind, &bytes)?;
        self.store.put(key, &bytes)?;
        Ok((bytes.len(), blake3::hash(&bytes).to_hex().to_string()))
    }
}

/// Gateways sometimes serve `.br` files already decoded; only decompress
/// payloads that do not carry the expected header.
fn decode_payload(path: &str, kind: ArtifactKind, raw: Vec<u8>) -> Result<Vec<u8>, ArtifactError> {
    if !kind.compressed_on_wire() || has_expected_header(kind, &raw) {
        return Ok(raw);
    }
    let mut out = Vec::new();
    brotli::Decompressor::new(raw.as_slice(), BROTLI_BUFFER_SIZE)
        .read_to_end(&mut out)
        .map_err(|err| ArtifactError::Decompression {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
    Ok(out)
}

#[async_trait]
impl ArtifactCallbacks for ArtifactCache {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        self.store.get(path)
    }

    async fn store(&self, path: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        self.store.put(path, bytes)
    }

    async fn exists(&self, path: &str) -> Result<bool, ArtifactError> {
        self.store.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use shieldswap_common::{default_networks, ArtifactProfile, CircuitShape, NetworkName};

    use crate::error::FetchError;
    use crate::variant::VKEY_REQUIRED_FIELD;

    const VKEY: &[u8] = br#"{"protocol":"groth16","vk_alpha_1":["1","2","1"]}"#;

    /// Serves canned bodies by path suffix and records every URL.
    #[derive(Default)]
    struct CannedFetcher {
        bodies: HashMap<String, Vec<u8>>,
        down_gateways: Vec<String>,
        requests: StdMutex<Vec<String>>,
    }

    impl CannedFetcher {
        fn serving_everything() -> Self {
            let mut bodies = HashMap::new();
            bodies.insert("vkey.json".to_string(), VKEY.to_vec());
            bodies.insert("zkey.br".to_string(), brotli_compress(b"zkey-proving-key"));
            bodies.insert("wasm.br".to_string(), b"\0asm-witness".to_vec());
            Self {
                bodies,
                ..Default::default()
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ArtifactFetcher for CannedFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.down_gateways.iter().any(|g| url.starts_with(g.as_str())) {
                return Err(FetchError::Timeout);
            }
            self.bodies
                .iter()
                .find(|(suffix, _)| url.ends_with(suffix.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or(FetchError::Status(404))
        }
    }

    fn brotli_compress(input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(input).unwrap();
        }
        out
    }

    fn custom_network() -> NetworkConfig {
        let mut network = default_networks()
            .get(&NetworkName::new("sepolia"))
            .unwrap()
            .clone();
        network.artifacts.shapes = vec![CircuitShape::new(1, 2)];
        network.artifacts.include_poi = false;
        network
    }

    fn cache_with(fetcher: Arc<CannedFetcher>) -> ArtifactCache {
        ArtifactCache::new(
            ArtifactStore::in_memory(),
            fetcher,
            PoiArtifactConfig {
                shapes: vec![CircuitShape::new(3, 3)],
                ..PoiArtifactConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn second_pass_performs_no_fetches() {
        let fetcher = Arc::new(CannedFetcher::serving_everything());
        let cache = cache_with(fetcher.clone());
        let network = custom_network();

        let first = cache.ensure_artifacts(&network).await;
        assert!(first.is_complete(), "{:?}", first.failed);
        assert_eq!(first.fetch_count(), 3);
        let after_first = fetcher.request_count();

        let second = cache.ensure_artifacts(&network).await;
        assert_eq!(second.fetch_count(), 0);
        assert_eq!(second.present, 3);
        assert_eq!(fetcher.request_count(), after_first);
    }

    #[tokio::test]
    async fn compressed_proving_key_is_stored_decompressed() {
        let fetcher = Arc::new(CannedFetcher::serving_everything());
        let cache = cache_with(fetcher);
        let network = custom_network();
        cache.ensure_artifacts(&network).await;

        let variant = ArtifactVariant::transact(CircuitShape::new(1, 2));
        let stored = cache
            .backing_store()
            .get(&storage_key("sepolia", &variant, ArtifactKind::ProvingKey))
            .unwrap()
            .unwrap();
        assert_eq!(stored, b"zkey-proving-key");
    }

    #[tokio::test]
    async fn verification_key_without_required_field_is_refetched() {
        let fetcher = Arc::new(CannedFetcher::serving_everything());
        let cache = cache_with(fetcher.clone());
        let network = custom_network();
        cache.ensure_artifacts(&network).await;

        let variant = ArtifactVariant::transact(CircuitShape::new(1, 2));
        let key = storage_key("sepolia", &variant, ArtifactKind::VerificationKey);
        cache.backing_store().put(&key, br#"{"protocol":"groth16"}"#).unwrap();
        assert!(cache
            .read("sepolia", &variant, ArtifactKind::VerificationKey)
            .unwrap()
            .is_none());

        let report = cache.ensure_artifacts(&network).await;
        assert_eq!(report.fetch_count(), 1);
        assert!(report.fetched[0].repaired);
        assert_eq!(report.fetched[0].key, key);

        let restored = cache.backing_store().get(&key).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&restored).unwrap();
        assert!(json.get(VKEY_REQUIRED_FIELD).is_some());
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let fetcher = Arc::new(CannedFetcher {
            bodies: HashMap::new(),
            ..Default::default()
        });
        let cache = cache_with(fetcher);
        let report = cache.ensure_artifacts(&custom_network()).await;
        assert_eq!(report.fetch_count(), 0);
        assert_eq!(report.failed.len(), 3);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn down_gateway_does_not_fail_priming() {
        let mut canned = CannedFetcher::serving_everything();
        canned.down_gateways = vec!["https://ipfs-lb.com".to_string()];
        let cache = cache_with(Arc::new(canned));
        let report = cache.ensure_artifacts(&custom_network()).await;
        assert!(report.is_complete());
        assert_eq!(report.fetch_count(), 3);
    }

    #[tokio::test]
    async fn bundled_networks_only_prime_poi_artifacts() {
        let fetcher = Arc::new(CannedFetcher::serving_everything());
        let cache = cache_with(fetcher);
        let mut network = custom_network();
        network.artifacts = ArtifactProfile::bundled("ethereum");

        let report = cache.ensure_artifacts(&network).await;
        assert_eq!(report.bundled_variants, network.artifacts.shapes.len());
        assert_eq!(report.fetch_count(), 3);
        assert!(report
            .fetched
            .iter()
            .all(|f| f.key.starts_with("ethereum/POI_3x3/")));
    }

    #[tokio::test]
    async fn schema_change_discards_old_entries() {
        let fetcher = Arc::new(CannedFetcher::serving_everything());
        let cache = cache_with(fetcher);
        cache.backing_store().put(VERSION_KEY, b"1").unwrap();
        cache.backing_store().put("stale/entry", b"old").unwrap();

        cache.ensure_artifacts(&custom_network()).await;
        assert!(!cache.backing_store().contains("stale/entry").unwrap());
        assert_eq!(
            cache.backing_store().get(VERSION_KEY).unwrap().unwrap(),
            CACHE_SCHEMA_VERSION.to_string().as_bytes()
        );
    }

    #[tokio::test]
    async fn engine_callbacks_read_through_store() {
        let cache = cache_with(Arc::new(CannedFetcher::default()));
        let callbacks: &dyn ArtifactCallbacks = &cache;
        assert!(!callbacks.exists("p/01x01/wasm").await.unwrap());
        callbacks.store("p/01x01/wasm", b"\0asm").await.unwrap();
        assert!(callbacks.exists("p/01x01/wasm").await.unwrap());
        assert_eq!(callbacks.get("p/01x01/wasm").await.unwrap().unwrap(), b"\0asm");
    }
}
