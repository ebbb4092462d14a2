//! Operator configuration.
//!
//! One signing key per running operator instance, carried in an explicitly
//! constructed, immutable configuration object injected into the handler at
//! startup — never a hidden singleton.

use ed25519_dalek::{SigningKey, VerifyingKey};
use std::time::Duration;

/// Identifier and preferences cookies live 3 months from write.
pub const DEFAULT_IDENTIFIER_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// The 3PC probe marker lives 1 minute from read.
pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct OperatorConfig {
    /// Hostname the operator signs responses as (the `sender` of every
    /// response and the issuing domain of every minted identifier).
    pub host: String,
    pub signing_key: SigningKey,
    pub identifier_ttl: Duration,
    pub marker_ttl: Duration,
    /// Replay hardening: when set, a signed request whose timestamp is
    /// further than this from now is rejected. `None` (the default) matches
    /// the observed protocol, which has no freshness check.
    pub max_timestamp_skew: Option<Duration>,
}

impl OperatorConfig {
    pub fn new(host: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            host: host.into(),
            signing_key,
            identifier_ttl: DEFAULT_IDENTIFIER_TTL,
            marker_ttl: DEFAULT_MARKER_TTL,
            max_timestamp_skew: None,
        }
    }

    pub fn with_max_timestamp_skew(mut self, skew: Duration) -> Self {
        self.max_timestamp_skew = Some(skew);
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}
