//! Identity issuance.

use adid_crypto::{IdentifierSigner, SignatureError};
use adid_model::{
    epoch_seconds_now, Identifier, UnsignedIdentifier, UnsignedSource, IDENTIFIER_KIND,
    PROTOCOL_VERSION,
};
use ed25519_dalek::SigningKey;

/// Mints fresh pseudonymous identifiers with signed provenance.
///
/// Uniqueness rests on the UUID v4 value space; no global coordination or
/// explicit collision checking.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityIssuer {
    signer: IdentifierSigner,
}

impl IdentityIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh identifier stamped with `issuing_domain` provenance.
    ///
    /// `timestamp` defaults to now, resolved once here. The result carries
    /// `persisted: false` — the caller has not yet confirmed durable storage.
    pub fn issue(
        &self,
        key: &SigningKey,
        issuing_domain: &str,
        timestamp: Option<u64>,
    ) -> Result<Identifier, SignatureError> {
        let unsigned = UnsignedIdentifier {
            version: PROTOCOL_VERSION,
            kind: IDENTIFIER_KIND.to_string(),
            value: uuid::Uuid::new_v4().to_string(),
            source: UnsignedSource {
                domain: issuing_domain.to_string(),
                timestamp: timestamp.unwrap_or_else(epoch_seconds_now),
            },
        };
        let signature = self.signer.sign(key, &unsigned)?;
        let mut identifier = unsigned.into_signed(signature);
        identifier.persisted = Some(false);
        Ok(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adid_crypto::generate_signing_key;

    #[test]
    fn issued_identifier_verifies_and_is_unpersisted() {
        let key = generate_signing_key();
        let issuer = IdentityIssuer::new();
        let id = issuer.issue(&key, "operator.example", Some(1_700_000_000)).unwrap();

        assert_eq!(id.version, PROTOCOL_VERSION);
        assert_eq!(id.kind, IDENTIFIER_KIND);
        assert_eq!(id.source.domain, "operator.example");
        assert_eq!(id.source.timestamp, 1_700_000_000);
        assert_eq!(id.persisted, Some(false));
        IdentifierSigner.verify(&key.verifying_key(), &id).unwrap();
    }

    #[test]
    fn issued_values_are_distinct() {
        let key = generate_signing_key();
        let issuer = IdentityIssuer::new();
        let a = issuer.issue(&key, "operator.example", None).unwrap();
        let b = issuer.issue(&key, "operator.example", None).unwrap();
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn mutated_provenance_fails_verification() {
        let key = generate_signing_key();
        let id = IdentityIssuer::new()
            .issue(&key, "operator.example", None)
            .unwrap();

        let mut tampered = id;
        tampered.source.domain = "imposter.example".to_string();
        assert!(IdentifierSigner
            .verify(&key.verifying_key(), &tampered)
            .is_err());
    }
}
