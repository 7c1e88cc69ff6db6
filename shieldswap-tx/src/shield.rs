//! One-time shield key derivation.

use ethers::types::H256;
use ethers::utils::keccak256;

/// Message the public wallet signs to derive the one-time shield key.
pub const SHIELD_SIGNATURE_MESSAGE: &str = "SHIELDSWAP_SHIELD";

/// keccak-256 of the wallet's signature over [`SHIELD_SIGNATURE_MESSAGE`].
pub fn derive_shield_key(signature: &[u8]) -> H256 {
    H256::from(keccak256(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_per_signature() {
        let a = derive_shield_key(b"signature-a");
        assert_eq!(a, derive_shield_key(b"signature-a"));
        assert_ne!(a, derive_shield_key(b"signature-b"));
        assert_eq!(derive_shield_key(b""), H256::from(keccak256(b"")));
    }
}
