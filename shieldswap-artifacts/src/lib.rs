//! Proving artifact cache.
//!
//! Every network stores its verification keys, proving keys and witness
//! programs under its own prefix. [`ArtifactCache::ensure_artifacts`] checks
//! what is present, throws away entries that do not look right, and pulls the
//! rest from a prioritised list of content-addressed gateways.
//!
//! ```text
//!  ensure_artifacts(network)
//!        │
//!        ├── schema marker ok? ── no ──► wipe store
//!        │
//!        ├── for each variant × {vkey, zkey, wasm}
//!        │       present & valid ──► keep
//!        │       corrupt         ──► remove ─┐
//!        │       missing         ───────────►├─► gateway 1 ─► gateway 2 ─► …
//!        │                                   └─► decompress ─► validate ─► store
//!        ▼
//!   ArtifactReport (never an error)
//! ```

pub mod cache;
pub mod error;
pub mod fetch;
pub mod store;
pub mod variant;

pub use cache::{
    ArtifactCache, ArtifactCallbacks, ArtifactFailure, ArtifactReport, FetchedArtifact,
    CACHE_SCHEMA_VERSION, VERSION_KEY,
};
pub use error::{ArtifactError, FetchError};
pub use fetch::{fetch_from_gateways, ArtifactFetcher, HttpArtifactFetcher};
pub use store::ArtifactStore;
pub use variant::{
    storage_key, validate_structure, ArtifactKind, ArtifactPayload, ArtifactVariant,
    CachedArtifact, CircuitFamily, VKEY_REQUIRED_FIELD,
};
