//! Hex codecs for Ed25519 key material.
//!
//! Keys live in config files as hex-encoded 32-byte strings; signatures on
//! the wire are hex-encoded 64-byte strings.

use crate::SignatureError;
use ed25519_dalek::{SigningKey, VerifyingKey};

/// Parse a hex-encoded 32-byte Ed25519 private key.
pub fn signing_key_from_hex(input: &str) -> Result<SigningKey, SignatureError> {
    let bytes = hex::decode(input.trim()).map_err(|_| SignatureError::MalformedKey)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignatureError::MalformedKey)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Parse a hex-encoded 32-byte Ed25519 public key.
pub fn verifying_key_from_hex(input: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = hex::decode(input.trim()).map_err(|_| SignatureError::MalformedKey)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignatureError::MalformedKey)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::MalformedKey)
}

pub fn signing_key_to_hex(key: &SigningKey) -> String {
    hex::encode(key.to_bytes())
}

pub fn verifying_key_to_hex(key: &VerifyingKey) -> String {
    hex::encode(key.as_bytes())
}

/// Generate a fresh operator keypair from the system RNG.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_hex_roundtrip() {
        let key = generate_signing_key();
        let back = signing_key_from_hex(&signing_key_to_hex(&key)).unwrap();
        assert_eq!(key.to_bytes(), back.to_bytes());
    }

    #[test]
    fn verifying_key_hex_roundtrip() {
        let key = generate_signing_key().verifying_key();
        let back = verifying_key_from_hex(&verifying_key_to_hex(&key)).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn rejects_short_and_non_hex_input() {
        assert!(matches!(
            signing_key_from_hex("abcd"),
            Err(SignatureError::MalformedKey)
        ));
        assert!(matches!(
            verifying_key_from_hex("not hex at all"),
            Err(SignatureError::MalformedKey)
        ));
    }
}
