//! Signature layer of the adid exchange protocol.
//!
//! Every protocol message is signed over a canonical byte sequence derived
//! from its unsigned fields in a fixed order. Any two parties holding the
//! same unsigned fields derive the same bytes; a single altered byte fails
//! verification. Verification is fail-closed: a sender without a registered
//! public key is a verification failure, not a no-op.

#![deny(unsafe_code)]

mod directory;
mod keys;
mod signer;

pub use directory::PartnerDirectory;
pub use keys::{
    generate_signing_key, signing_key_from_hex, signing_key_to_hex, verifying_key_from_hex,
    verifying_key_to_hex,
};
pub use signer::{EnvelopeSigner, IdentifierSigner, MessageShape};

use thiserror::Error;

/// Signature-layer errors.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// No public key registered for the claimed sender. Fail closed.
    #[error("no public key registered for sender '{0}'")]
    UnknownSigner(String),

    /// Signature does not verify against the canonical bytes.
    #[error("signature verification failed")]
    BadSignature,

    /// Key material is not a valid hex-encoded Ed25519 key.
    #[error("malformed key material")]
    MalformedKey,

    /// Signature is not 64 hex-encoded bytes.
    #[error("malformed signature encoding")]
    MalformedSignature,

    /// A message field could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalize(String),

    /// The key directory file could not be parsed.
    #[error("malformed key directory: {0}")]
    MalformedDirectory(String),
}
