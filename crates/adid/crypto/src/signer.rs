//! Canonical byte construction and the typed envelope signer.
//!
//! One generic signer parameterized by a message-shape tag replaces the five
//! near-identical per-shape signer/verifier pairs the protocol calls for. The
//! tag is mixed into the canonical bytes, so a signature over one shape can
//! never verify as another even when the field values coincide.

use crate::SignatureError;
use adid_model::{
    Envelope, Identifier, ReadRequest, UnsignedEnvelope, UnsignedIdentifier, UnsignedReadRequest,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;

/// Separator between canonicalized fields. Cannot occur inside a JSON token,
/// so field boundaries are unambiguous.
const FIELD_SEPARATOR: u8 = 0x1f;

/// The five signed message shapes of the exchange protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageShape {
    ReadRequest,
    WriteRequest,
    ReadResponse,
    WriteResponse,
    NewIdResponse,
}

impl MessageShape {
    pub const fn tag(self) -> &'static str {
        match self {
            MessageShape::ReadRequest => "read-request",
            MessageShape::WriteRequest => "write-request",
            MessageShape::ReadResponse => "read-response",
            MessageShape::WriteResponse => "write-response",
            MessageShape::NewIdResponse => "new-id-response",
        }
    }
}

/// Signs and verifies envelopes of a single message shape.
#[derive(Clone, Copy, Debug)]
pub struct EnvelopeSigner {
    shape: MessageShape,
}

impl EnvelopeSigner {
    pub const fn new(shape: MessageShape) -> Self {
        Self { shape }
    }

    pub const fn read_request() -> Self {
        Self::new(MessageShape::ReadRequest)
    }

    pub const fn write_request() -> Self {
        Self::new(MessageShape::WriteRequest)
    }

    pub const fn read_response() -> Self {
        Self::new(MessageShape::ReadResponse)
    }

    pub const fn write_response() -> Self {
        Self::new(MessageShape::WriteResponse)
    }

    pub const fn new_id_response() -> Self {
        Self::new(MessageShape::NewIdResponse)
    }

    /// Canonical bytes: shape tag, then each field's JSON encoding in fixed
    /// order (sender, receiver, timestamp, body if the shape has one),
    /// separated by [`FIELD_SEPARATOR`]. Identical on sign and verify.
    fn canonical_bytes<T: Serialize>(
        &self,
        sender: &str,
        receiver: &str,
        timestamp: u64,
        body: Option<&T>,
    ) -> Result<Vec<u8>, SignatureError> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(self.shape.tag().as_bytes());
        push_field(&mut buf, &sender)?;
        push_field(&mut buf, &receiver)?;
        push_field(&mut buf, &timestamp)?;
        if let Some(body) = body {
            push_field(&mut buf, body)?;
        }
        Ok(buf)
    }

    /// Sign an unsigned envelope, returning the hex-encoded signature.
    pub fn sign<T: Serialize>(
        &self,
        key: &SigningKey,
        unsigned: &UnsignedEnvelope<T>,
    ) -> Result<String, SignatureError> {
        let bytes = self.canonical_bytes(
            &unsigned.sender,
            &unsigned.receiver,
            unsigned.timestamp,
            Some(&unsigned.body),
        )?;
        Ok(sign_bytes(key, &bytes))
    }

    /// Verify a signed envelope by reconstructing its unsigned form.
    pub fn verify<T: Serialize>(
        &self,
        key: &VerifyingKey,
        envelope: &Envelope<T>,
    ) -> Result<(), SignatureError> {
        let bytes = self.canonical_bytes(
            &envelope.sender,
            &envelope.receiver,
            envelope.timestamp,
            Some(&envelope.body),
        )?;
        verify_bytes(key, &bytes, &envelope.signature)
    }

    /// Sign a bodyless request (read, new-id).
    pub fn sign_bodyless(
        &self,
        key: &SigningKey,
        unsigned: &UnsignedReadRequest,
    ) -> Result<String, SignatureError> {
        let bytes = self.canonical_bytes::<()>(
            &unsigned.sender,
            &unsigned.receiver,
            unsigned.timestamp,
            None,
        )?;
        Ok(sign_bytes(key, &bytes))
    }

    /// Verify a bodyless request (read, new-id).
    pub fn verify_bodyless(
        &self,
        key: &VerifyingKey,
        request: &ReadRequest,
    ) -> Result<(), SignatureError> {
        let bytes =
            self.canonical_bytes::<()>(&request.sender, &request.receiver, request.timestamp, None)?;
        verify_bytes(key, &bytes, &request.signature)
    }
}

/// Signs and verifies bare identifiers (the provenance signature).
///
/// Covers `{version, type, value, source.domain, source.timestamp}` — never
/// the signature itself and never the `persisted` transport hint, so
/// provenance stays immutable while the hint comes and goes.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentifierSigner;

impl IdentifierSigner {
    const TAG: &'static str = "identifier";

    fn canonical_bytes(unsigned: &UnsignedIdentifier) -> Result<Vec<u8>, SignatureError> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(Self::TAG.as_bytes());
        push_field(&mut buf, &unsigned.version)?;
        push_field(&mut buf, &unsigned.kind)?;
        push_field(&mut buf, &unsigned.value)?;
        push_field(&mut buf, &unsigned.source.domain)?;
        push_field(&mut buf, &unsigned.source.timestamp)?;
        Ok(buf)
    }

    pub fn sign(
        &self,
        key: &SigningKey,
        unsigned: &UnsignedIdentifier,
    ) -> Result<String, SignatureError> {
        Ok(sign_bytes(key, &Self::canonical_bytes(unsigned)?))
    }

    /// Verify `identifier.source.signature` against the issuing domain's key.
    pub fn verify(
        &self,
        key: &VerifyingKey,
        identifier: &Identifier,
    ) -> Result<(), SignatureError> {
        let bytes = Self::canonical_bytes(&identifier.unsigned())?;
        verify_bytes(key, &bytes, &identifier.source.signature)
    }
}

fn push_field<T: Serialize>(buf: &mut Vec<u8>, field: &T) -> Result<(), SignatureError> {
    buf.push(FIELD_SEPARATOR);
    let bytes =
        serde_json::to_vec(field).map_err(|e| SignatureError::Canonicalize(e.to_string()))?;
    buf.extend_from_slice(&bytes);
    Ok(())
}

fn sign_bytes(key: &SigningKey, bytes: &[u8]) -> String {
    hex::encode(key.sign(bytes).to_bytes())
}

fn verify_bytes(
    key: &VerifyingKey,
    bytes: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let raw = hex::decode(signature_hex).map_err(|_| SignatureError::MalformedSignature)?;
    let raw: [u8; 64] = raw
        .try_into()
        .map_err(|_| SignatureError::MalformedSignature)?;
    let signature = Signature::from_bytes(&raw);
    key.verify(bytes, &signature)
        .map_err(|_| SignatureError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_signing_key;
    use adid_model::{IdPrefsBody, Preferences, UnsignedSource, IDENTIFIER_KIND, PROTOCOL_VERSION};
    use proptest::prelude::*;

    fn unsigned_identifier(domain: &str) -> UnsignedIdentifier {
        UnsignedIdentifier {
            version: PROTOCOL_VERSION,
            kind: IDENTIFIER_KIND.to_string(),
            value: "22a3b7c0-9d71-4f3e-b2da-46e30b1e4f82".to_string(),
            source: UnsignedSource {
                domain: domain.to_string(),
                timestamp: 1_700_000_000,
            },
        }
    }

    fn sample_body() -> IdPrefsBody {
        IdPrefsBody {
            identifiers: vec![],
            preferences: Some(Preferences(serde_json::json!({"personalized_ads": false}))),
        }
    }

    #[test]
    fn envelope_sign_verify_roundtrip() {
        let key = generate_signing_key();
        let signer = EnvelopeSigner::read_response();
        let unsigned =
            UnsignedEnvelope::build("operator.example", "publisher.example", sample_body(), Some(10));
        let signature = signer.sign(&key, &unsigned).unwrap();
        let envelope = unsigned.into_signed(signature);
        signer.verify(&key.verifying_key(), &envelope).unwrap();
    }

    #[test]
    fn envelope_rejects_other_keypair() {
        let key = generate_signing_key();
        let other = generate_signing_key();
        let signer = EnvelopeSigner::write_response();
        let unsigned =
            UnsignedEnvelope::build("operator.example", "publisher.example", sample_body(), Some(10));
        let signature = signer.sign(&key, &unsigned).unwrap();
        let envelope = unsigned.into_signed(signature);
        assert!(matches!(
            signer.verify(&other.verifying_key(), &envelope),
            Err(SignatureError::BadSignature)
        ));
    }

    #[test]
    fn envelope_rejects_mutated_fields() {
        let key = generate_signing_key();
        let signer = EnvelopeSigner::write_request();
        let unsigned =
            UnsignedEnvelope::build("publisher.example", "operator.example", sample_body(), Some(10));
        let signature = signer.sign(&key, &unsigned).unwrap();
        let envelope = unsigned.into_signed(signature);

        let mut tampered = envelope.clone();
        tampered.sender = "attacker.example".to_string();
        assert!(signer.verify(&key.verifying_key(), &tampered).is_err());

        let mut tampered = envelope.clone();
        tampered.timestamp += 1;
        assert!(signer.verify(&key.verifying_key(), &tampered).is_err());

        let mut tampered = envelope;
        tampered.body.preferences = Some(Preferences(serde_json::json!({"personalized_ads": true})));
        assert!(signer.verify(&key.verifying_key(), &tampered).is_err());
    }

    #[test]
    fn shape_tag_separates_otherwise_identical_messages() {
        let key = generate_signing_key();
        let unsigned =
            UnsignedEnvelope::build("operator.example", "publisher.example", sample_body(), Some(10));
        let signature = EnvelopeSigner::read_response().sign(&key, &unsigned).unwrap();
        let envelope = unsigned.into_signed(signature);
        assert!(EnvelopeSigner::write_response()
            .verify(&key.verifying_key(), &envelope)
            .is_err());
    }

    #[test]
    fn bodyless_request_roundtrip_and_tamper() {
        let key = generate_signing_key();
        let signer = EnvelopeSigner::read_request();
        let unsigned = UnsignedReadRequest::build("publisher.example", "operator.example", Some(99));
        let request = unsigned
            .clone()
            .into_signed(signer.sign_bodyless(&key, &unsigned).unwrap());
        signer
            .verify_bodyless(&key.verifying_key(), &request)
            .unwrap();

        let mut tampered = request;
        tampered.receiver = "other-operator.example".to_string();
        assert!(signer
            .verify_bodyless(&key.verifying_key(), &tampered)
            .is_err());
    }

    #[test]
    fn malformed_signature_encoding_is_rejected() {
        let key = generate_signing_key();
        let signer = EnvelopeSigner::read_request();
        let request = UnsignedReadRequest::build("publisher.example", "operator.example", Some(1))
            .into_signed("zz-not-hex".to_string());
        assert!(matches!(
            signer.verify_bodyless(&key.verifying_key(), &request),
            Err(SignatureError::MalformedSignature)
        ));
    }

    #[test]
    fn identifier_roundtrip_and_single_field_mutations() {
        let key = generate_signing_key();
        let signer = IdentifierSigner;
        let unsigned = unsigned_identifier("operator.example");
        let id = unsigned
            .clone()
            .into_signed(signer.sign(&key, &unsigned).unwrap());
        signer.verify(&key.verifying_key(), &id).unwrap();

        let mut tampered = id.clone();
        tampered.value = "00000000-0000-0000-0000-000000000000".to_string();
        assert!(signer.verify(&key.verifying_key(), &tampered).is_err());

        let mut tampered = id.clone();
        tampered.source.domain = "attacker.example".to_string();
        assert!(signer.verify(&key.verifying_key(), &tampered).is_err());

        let mut tampered = id.clone();
        tampered.source.timestamp += 1;
        assert!(signer.verify(&key.verifying_key(), &tampered).is_err());

        // The persisted hint is transport-only and not covered.
        let mut hinted = id;
        hinted.persisted = Some(false);
        signer.verify(&key.verifying_key(), &hinted).unwrap();
    }

    proptest! {
        #[test]
        fn envelope_integrity_over_arbitrary_parties(
            sender in "[a-z]{1,12}\\.example",
            receiver in "[a-z]{1,12}\\.example",
            timestamp in 0u64..=4_102_444_800,
        ) {
            let key = generate_signing_key();
            let signer = EnvelopeSigner::read_request();
            let unsigned = UnsignedReadRequest::build(sender, receiver, Some(timestamp));
            let request = unsigned
                .clone()
                .into_signed(signer.sign_bodyless(&key, &unsigned).unwrap());
            prop_assert!(signer.verify_bodyless(&key.verifying_key(), &request).is_ok());

            let mut tampered = request;
            tampered.timestamp = tampered.timestamp.wrapping_add(1);
            prop_assert!(signer.verify_bodyless(&key.verifying_key(), &tampered).is_err());
        }
    }
}
