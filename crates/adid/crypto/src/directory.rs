//! Partner public-key directory.
//!
//! The lookup table mapping a sender domain to the Ed25519 key its messages
//! must verify against. How keys get distributed is out of scope; the
//! directory is loaded once at startup from a JSON object of
//! `"domain": "hex public key"` entries.

use crate::{keys::verifying_key_from_hex, SignatureError};
use ed25519_dalek::VerifyingKey;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct PartnerDirectory {
    keys: HashMap<String, VerifyingKey>,
}

impl PartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `{"domain": "hex key", ...}` JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, SignatureError> {
        let raw: HashMap<String, String> = serde_json::from_str(input)
            .map_err(|e| SignatureError::MalformedDirectory(e.to_string()))?;
        let mut directory = Self::new();
        for (domain, key_hex) in raw {
            let key = verifying_key_from_hex(&key_hex)?;
            directory.insert(domain, key);
        }
        Ok(directory)
    }

    pub fn insert(&mut self, domain: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(domain.into(), key);
    }

    /// Key for a claimed sender. Absence is a verification failure, never a
    /// no-op.
    pub fn key_for(&self, domain: &str) -> Result<&VerifyingKey, SignatureError> {
        self.keys
            .get(domain)
            .ok_or_else(|| SignatureError::UnknownSigner(domain.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
