//! Wire data model for the adid exchange protocol.
//!
//! Every message exchanged between a partner and the operator is a signed
//! envelope; the types here are the exact wire shapes, signed and unsigned.
//! Signatures are produced and checked in `adid-crypto` — this crate only
//! says what the bytes look like.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Protocol version stamped on every identifier.
pub const PROTOCOL_VERSION: u8 = 0;

/// Identifier kind minted by the operator.
pub const IDENTIFIER_KIND: &str = "adid";

/// Cookie names used by the operator, scoped to its registrable domain.
pub mod cookies {
    /// Holds the JSON-serialized [`Identifier`](crate::Identifier).
    pub const IDENTIFIER: &str = "adid_identifier";
    /// Holds the JSON-serialized [`Preferences`](crate::Preferences).
    pub const PREFERENCES: &str = "adid_preferences";
    /// Short-lived marker used by the third-party-cookie probe.
    pub const TEST_3PC: &str = "adid_test_3pc";
}

/// Query parameter names shared by both transports.
pub mod params {
    pub const SENDER: &str = "sender";
    pub const RECEIVER: &str = "receiver";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SIGNATURE: &str = "signature";
    /// Opaque JSON payload slot (signed write request, signed response).
    pub const DATA: &str = "data";
    /// Redirect destination supplied by the caller.
    pub const RETURN_URL: &str = "returnUrl";
}

/// Endpoint paths for both surfaces.
pub mod endpoints {
    pub const REDIRECT_READ: &str = "/v1/redirect/read";
    pub const REDIRECT_WRITE: &str = "/v1/redirect/write";
    pub const JSON_READ: &str = "/v1/json/read";
    pub const JSON_WRITE: &str = "/v1/json/write";
    pub const JSON_NEW_ID: &str = "/v1/json/new-id";
    pub const JSON_VERIFY_3PC: &str = "/v1/json/verify-3pc";
}

/// Seconds since the Unix epoch, the protocol's only notion of time.
pub fn epoch_seconds_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Provenance of an identifier: who issued it, when, and their signature
/// over the identifier's unsigned fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub domain: String,
    pub timestamp: u64,
    /// Hex-encoded signature by `domain` over the unsigned identifier.
    pub signature: String,
}

/// Provenance fields before the issuer has signed them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedSource {
    pub domain: String,
    pub timestamp: u64,
}

/// A pseudonymous, provenance-stamped user identifier.
///
/// `persisted` is a transport-only hint: `false` means the issuer has not yet
/// seen the identifier stored durably. It defaults to true when absent and is
/// omitted rather than sent as `true`, and is never covered by the signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub version: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
}

impl Identifier {
    /// The exact fields covered by `source.signature`.
    pub fn unsigned(&self) -> UnsignedIdentifier {
        UnsignedIdentifier {
            version: self.version,
            kind: self.kind.clone(),
            value: self.value.clone(),
            source: UnsignedSource {
                domain: self.source.domain.clone(),
                timestamp: self.source.timestamp,
            },
        }
    }

    /// Drop the transport-only persistence hint (absent means "persisted").
    pub fn clear_persisted_hint(&mut self) {
        self.persisted = None;
    }
}

/// An identifier before its issuer has signed the provenance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedIdentifier {
    pub version: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub source: UnsignedSource,
}

impl UnsignedIdentifier {
    pub fn into_signed(self, signature: String) -> Identifier {
        Identifier {
            version: self.version,
            kind: self.kind,
            value: self.value,
            source: Source {
                domain: self.source.domain,
                timestamp: self.source.timestamp,
                signature,
            },
            persisted: None,
        }
    }
}

/// Opaque structured consent data. Carried and persisted verbatim, never
/// interpreted by the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(pub serde_json::Value);

/// Signed wrapper around any protocol message body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub sender: String,
    pub receiver: String,
    pub timestamp: u64,
    pub body: T,
    /// Hex-encoded signature over `{sender, receiver, body, timestamp}`.
    pub signature: String,
}

impl<T: Clone> Envelope<T> {
    /// Reconstruct the unsigned form the signature was computed over.
    pub fn to_unsigned(&self) -> UnsignedEnvelope<T> {
        UnsignedEnvelope {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            timestamp: self.timestamp,
            body: self.body.clone(),
        }
    }
}

/// Envelope fields before signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEnvelope<T> {
    pub sender: String,
    pub receiver: String,
    pub timestamp: u64,
    pub body: T,
}

impl<T> UnsignedEnvelope<T> {
    /// Canonical message builder: same field set and order for every message
    /// of a given shape, so signer and verifier canonicalize identically.
    /// `timestamp` defaults to now, resolved here and nowhere else.
    pub fn build(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        body: T,
        timestamp: Option<u64>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            timestamp: timestamp.unwrap_or_else(epoch_seconds_now),
            body,
        }
    }

    pub fn into_signed(self, signature: String) -> Envelope<T> {
        Envelope {
            sender: self.sender,
            receiver: self.receiver,
            timestamp: self.timestamp,
            body: self.body,
            signature,
        }
    }
}

/// A bodyless signed request (read, new-id). Its own type rather than
/// `Envelope<()>` so no `body` key ever appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub sender: String,
    pub receiver: String,
    pub timestamp: u64,
    pub signature: String,
}

impl ReadRequest {
    pub fn to_unsigned(&self) -> UnsignedReadRequest {
        UnsignedReadRequest {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Bodyless request fields before signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedReadRequest {
    pub sender: String,
    pub receiver: String,
    pub timestamp: u64,
}

impl UnsignedReadRequest {
    pub fn build(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        timestamp: Option<u64>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            timestamp: timestamp.unwrap_or_else(epoch_seconds_now),
        }
    }

    pub fn into_signed(self, signature: String) -> ReadRequest {
        ReadRequest {
            sender: self.sender,
            receiver: self.receiver,
            timestamp: self.timestamp,
            signature,
        }
    }
}

/// Body of a write request and of read/write responses. Identifiers always
/// travel as an array on the wire, even when exactly one is carried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPrefsBody {
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
}

impl IdPrefsBody {
    pub fn has_identifiers(&self) -> bool {
        !self.identifiers.is_empty()
    }
}

/// Body of a new-id response: exactly one freshly issued identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdBody {
    pub identifiers: Vec<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identifier(persisted: Option<bool>) -> Identifier {
        Identifier {
            version: PROTOCOL_VERSION,
            kind: IDENTIFIER_KIND.to_string(),
            value: "5f9acb3c-1a43-4c27-bb73-3d32128c63a7".to_string(),
            source: Source {
                domain: "operator.example".to_string(),
                timestamp: 1_700_000_000,
                signature: "ab".repeat(64),
            },
            persisted,
        }
    }

    #[test]
    fn persisted_hint_is_omitted_when_absent() {
        let json = serde_json::to_value(sample_identifier(None)).unwrap();
        assert!(json.get("persisted").is_none());
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("adid"));
    }

    #[test]
    fn persisted_hint_survives_roundtrip_when_present() {
        let id = sample_identifier(Some(false));
        let json = serde_json::to_string(&id).unwrap();
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back.persisted, Some(false));
    }

    #[test]
    fn unsigned_form_drops_signature_and_hint() {
        let id = sample_identifier(Some(false));
        let unsigned = id.unsigned();
        assert_eq!(unsigned.value, id.value);
        assert_eq!(unsigned.source.domain, id.source.domain);
        let json = serde_json::to_value(&unsigned).unwrap();
        assert!(json.get("persisted").is_none());
        assert!(json["source"].get("signature").is_none());
    }

    #[test]
    fn read_request_wire_shape_has_no_body_key() {
        let request = UnsignedReadRequest::build("publisher.example", "operator.example", Some(7))
            .into_signed("cd".repeat(64));
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("body").is_none());
        assert_eq!(json["timestamp"], 7);
    }

    #[test]
    fn envelope_builder_defaults_timestamp_to_now() {
        let before = epoch_seconds_now();
        let unsigned = UnsignedEnvelope::build(
            "operator.example",
            "publisher.example",
            NewIdBody { identifiers: vec![] },
            None,
        );
        assert!(unsigned.timestamp >= before);
        assert!(unsigned.timestamp <= epoch_seconds_now());
    }

    #[test]
    fn unsigned_envelope_matches_signed_minus_signature() {
        let body = IdPrefsBody {
            identifiers: vec![sample_identifier(None)],
            preferences: Some(Preferences(serde_json::json!({"use_browsing_for_personalization": true}))),
        };
        let unsigned =
            UnsignedEnvelope::build("operator.example", "publisher.example", body, Some(42));
        let signed = unsigned.clone().into_signed("ef".repeat(64));
        assert_eq!(signed.to_unsigned(), unsigned);
    }
}
