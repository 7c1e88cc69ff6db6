//! Artifact identities, storage keys and structural validation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shieldswap_common::CircuitShape;

use crate::error::ArtifactError;

/// A verification key is only trusted when it carries this field.
pub const VKEY_REQUIRED_FIELD: &str = "vk_alpha_1";

const ZKEY_MAGIC: &[u8; 4] = b"zkey";
const WASM_MAGIC: &[u8; 4] = b"\0asm";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitFamily {
    Transact,
    ProofOfInnocence,
}

/// One circuit whose artifacts are cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactVariant {
    pub family: CircuitFamily,
    pub shape: CircuitShape,
}

impl ArtifactVariant {
    pub const fn transact(shape: CircuitShape) -> Self {
        Self {
            family: CircuitFamily::Transact,
            shape,
        }
    }

    pub const fn poi(shape: CircuitShape) -> Self {
        Self {
            family: CircuitFamily::ProofOfInnocence,
            shape,
        }
    }

    /// Directory name shared by the store and the distribution network.
    pub fn dir_name(&self) -> String {
        match self.family {
            CircuitFamily::Transact => self.shape.to_string(),
            CircuitFamily::ProofOfInnocence => {
                format!("POI_{}x{}", self.shape.inputs, self.shape.outputs)
            }
        }
    }

    /// Path of `kind` relative to the distribution content hash.
    pub fn distribution_path(&self, kind: ArtifactKind) -> String {
        format!("{}/{}", self.dir_name(), kind.distribution_name())
    }
}

impl fmt::Display for ArtifactVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    VerificationKey,
    ProvingKey,
    WitnessProgram,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::VerificationKey,
        ArtifactKind::ProvingKey,
        ArtifactKind::WitnessProgram,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::VerificationKey => "vkey.json",
            Self::ProvingKey => "zkey",
            Self::WitnessProgram => "wasm",
        }
    }

    pub fn distribution_name(self) -> &'static str {
        match self {
            Self::VerificationKey => "vkey.json",
            Self::ProvingKey => "zkey.br",
            Self::WitnessProgram => "wasm.br",
        }
    }

    /// Whether the distribution network serves this kind brotli-compressed.
    pub fn compressed_on_wire(self) -> bool {
        !matches!(self, Self::VerificationKey)
    }

    /// Per-request fetch budget. Proving keys are tens of megabytes.
    pub fn fetch_timeout(self) -> Duration {
        match self {
            Self::VerificationKey => Duration::from_secs(30),
            Self::WitnessProgram => Duration::from_secs(120),
            Self::ProvingKey => Duration::from_secs(600),
        }
    }
}

/// `{prefix}/{variant}/{file}`
pub fn storage_key(prefix: &str, variant: &ArtifactVariant, kind: ArtifactKind) -> String {
    format!("{}/{}/{}", prefix, variant.dir_name(), kind.file_name())
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactPayload {
    Binary(Vec<u8>),
    Json(serde_json::Value),
}

/// A cache entry as handed to readers.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedArtifact {
    pub path: String,
    pub payload: ArtifactPayload,
}

impl CachedArtifact {
    /// Decode stored bytes; verification keys become JSON.
    pub fn decode(path: String, kind: ArtifactKind, bytes: Vec<u8>) -> Result<Self, ArtifactError> {
        let payload = match kind {
            ArtifactKind::VerificationKey => ArtifactPayload::Json(parse_verification_key(&path, &bytes)?),
            ArtifactKind::ProvingKey | ArtifactKind::WitnessProgram => {
                validate_structure(&path, kind, &bytes)?;
                ArtifactPayload::Binary(bytes)
            }
        };
        Ok(Self { path, payload })
    }
}

/// Check that `bytes` look like an artifact of `kind`.
pub fn validate_structure(key: &str, kind: ArtifactKind, bytes: &[u8]) -> Result<(), ArtifactError> {
    match kind {
        ArtifactKind::VerificationKey => parse_verification_key(key, bytes).map(|_| ()),
        ArtifactKind::ProvingKey => expect_magic(key, bytes, ZKEY_MAGIC),
        ArtifactKind::WitnessProgram => expect_magic(key, bytes, WASM_MAGIC),
    }
}

fn parse_verification_key(key: &str, bytes: &[u8]) -> Result<serde_json::Value, ArtifactError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|err| ArtifactError::Malformed {
            key: key.to_string(),
            reason: format!("not JSON: {}", err),
        })?;
    if value.get(VKEY_REQUIRED_FIELD).is_none() {
        return Err(ArtifactError::Malformed {
            key: key.to_string(),
            reason: format!("missing `{}`", VKEY_REQUIRED_FIELD),
        });
    }
    Ok(value)
}

fn expect_magic(key: &str, bytes: &[u8], magic: &[u8; 4]) -> Result<(), ArtifactError> {
    if bytes.starts_with(magic) {
        Ok(())
    } else {
        Err(ArtifactError::Malformed {
            key: key.to_string(),
            reason: "unexpected header".to_string(),
        })
    }
}

/// Whether `bytes` already carry the header of `kind`.
pub(crate) fn has_expected_header(kind: ArtifactKind, bytes: &[u8]) -> bool {
    match kind {
        ArtifactKind::VerificationKey => true,
        ArtifactKind::ProvingKey => bytes.starts_with(ZKEY_MAGIC),
        ArtifactKind::WitnessProgram => bytes.starts_with(WASM_MAGIC),
    }
}
