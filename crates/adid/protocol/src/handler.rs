//! The exchange protocol handler.
//!
//! One method per operation; each verifies the request signature against the
//! sender's registered key before reading or deciding anything, then produces
//! a signed response plus cookie instructions. Every failure is terminal for
//! the request — retry, if any, is a caller concern.

use crate::{
    config::OperatorConfig,
    cookies::{CookieWrite, StoredState},
    issuer::IdentityIssuer,
};
use adid_crypto::{EnvelopeSigner, PartnerDirectory, SignatureError};
use adid_model::{
    cookies, epoch_seconds_now, Envelope, IdPrefsBody, NewIdBody, ReadRequest, UnsignedEnvelope,
};
use serde::Serialize;
use thiserror::Error;

/// Terminal rejection reasons. All map to a client error at the transport.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Signature invalid, signer unknown, or the request cannot be
    /// canonicalized for checking.
    #[error("request verification failed: {0}")]
    Verification(#[from] SignatureError),

    /// Request timestamp outside the configured skew window. A
    /// verification-class failure, kept distinct for logging.
    #[error("request timestamp outside the accepted window")]
    StaleTimestamp,

    /// Redirect transport without a usable return destination.
    #[error("no usable return target for redirect transport")]
    MissingReturnTarget,

    /// Unparsable or incomplete request payload.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// A response or cookie value failed to serialize. Server-side fault.
    #[error("response encoding failed: {0}")]
    Encode(String),
}

/// Signed response plus the cookie instructions that accompany it.
#[derive(Clone, Debug)]
pub struct ExchangeOutcome<T> {
    pub response: Envelope<T>,
    pub cookies: Vec<CookieWrite>,
}

/// Result of the unsigned third-party-cookie probe.
#[derive(Clone, Debug)]
pub struct ProbeOutcome {
    pub cookie_returned: bool,
    pub cookies: Vec<CookieWrite>,
}

/// Per-request state machine over the three signed operations and the
/// unsigned probe.
pub struct ExchangeHandler {
    config: OperatorConfig,
    partners: PartnerDirectory,
    issuer: IdentityIssuer,
}

impl ExchangeHandler {
    pub fn new(config: OperatorConfig, partners: PartnerDirectory) -> Self {
        Self {
            config,
            partners,
            issuer: IdentityIssuer::new(),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Read the current (identifier, preferences) pair, minting an identifier
    /// on first visit. Every read also plants the 3PC probe marker.
    pub fn read(
        &self,
        request: &ReadRequest,
        state: StoredState,
    ) -> Result<ExchangeOutcome<IdPrefsBody>, ExchangeError> {
        let key = self.partners.key_for(&request.sender)?;
        EnvelopeSigner::read_request().verify_bodyless(key, request)?;
        self.check_freshness(request.timestamp)?;
        tracing::debug!(sender = %request.sender, "verified read request");

        let identifier = match state.identifier {
            Some(existing) => existing,
            None => self
                .issuer
                .issue(&self.config.signing_key, &self.config.host, None)?,
        };
        let body = IdPrefsBody {
            identifiers: vec![identifier],
            preferences: state.preferences,
        };

        let response = self.sign_response(EnvelopeSigner::read_response(), &request.sender, body)?;
        let marker = chrono::Utc::now().timestamp_millis().to_string();
        Ok(ExchangeOutcome {
            response,
            cookies: vec![CookieWrite::set(
                cookies::TEST_3PC,
                marker,
                self.config.marker_ttl,
            )],
        })
    }

    /// Persist the partner-supplied identifier and/or preferences, then echo
    /// them back signed. Verification precedes every persistence instruction,
    /// so a rejected write mutates nothing.
    pub fn write(
        &self,
        request: Envelope<IdPrefsBody>,
    ) -> Result<ExchangeOutcome<IdPrefsBody>, ExchangeError> {
        let key = self.partners.key_for(&request.sender)?;
        EnvelopeSigner::write_request().verify(key, &request)?;
        self.check_freshness(request.timestamp)?;
        tracing::debug!(
            sender = %request.sender,
            identifiers = request.body.identifiers.len(),
            has_preferences = request.body.preferences.is_some(),
            "verified write request"
        );

        let sender = request.sender;
        let mut body = request.body;
        // Absent means persisted; the hint is never echoed back as true.
        for identifier in &mut body.identifiers {
            identifier.clear_persisted_hint();
        }

        let mut writes = Vec::new();
        if let Some(identifier) = body.identifiers.first() {
            writes.push(CookieWrite::set(
                cookies::IDENTIFIER,
                to_json(identifier)?,
                self.config.identifier_ttl,
            ));
        }
        if let Some(preferences) = &body.preferences {
            writes.push(CookieWrite::set(
                cookies::PREFERENCES,
                to_json(preferences)?,
                self.config.identifier_ttl,
            ));
        }

        let response = self.sign_response(EnvelopeSigner::write_response(), &sender, body)?;
        Ok(ExchangeOutcome {
            response,
            cookies: writes,
        })
    }

    /// Issuance-only operation: mint a fresh identifier without reading any
    /// existing state.
    pub fn new_id(
        &self,
        request: &ReadRequest,
    ) -> Result<ExchangeOutcome<NewIdBody>, ExchangeError> {
        let key = self.partners.key_for(&request.sender)?;
        EnvelopeSigner::read_request().verify_bodyless(key, request)?;
        self.check_freshness(request.timestamp)?;
        tracing::debug!(sender = %request.sender, "verified new-id request");

        let identifier = self
            .issuer
            .issue(&self.config.signing_key, &self.config.host, None)?;
        let body = NewIdBody {
            identifiers: vec![identifier],
        };
        let response =
            self.sign_response(EnvelopeSigner::new_id_response(), &request.sender, body)?;
        Ok(ExchangeOutcome {
            response,
            cookies: Vec::new(),
        })
    }

    /// Third-party-cookie probe. Intentionally unsigned — there is no partner
    /// identity to verify. Reports whether the marker came back and consumes
    /// it either way.
    pub fn probe(&self, state: &StoredState) -> ProbeOutcome {
        let cookie_returned = state
            .probe_marker
            .as_deref()
            .is_some_and(|marker| !marker.is_empty());
        ProbeOutcome {
            cookie_returned,
            cookies: vec![CookieWrite::clear(cookies::TEST_3PC)],
        }
    }

    fn check_freshness(&self, timestamp: u64) -> Result<(), ExchangeError> {
        let Some(max_skew) = self.config.max_timestamp_skew else {
            return Ok(());
        };
        let now = epoch_seconds_now();
        let skew = now.abs_diff(timestamp);
        if skew > max_skew.as_secs() {
            tracing::warn!(timestamp, now, "rejecting request outside skew window");
            return Err(ExchangeError::StaleTimestamp);
        }
        Ok(())
    }

    fn sign_response<T: Serialize + Clone>(
        &self,
        signer: EnvelopeSigner,
        receiver: &str,
        body: T,
    ) -> Result<Envelope<T>, ExchangeError> {
        let unsigned = UnsignedEnvelope::build(self.config.host.clone(), receiver, body, None);
        let signature = signer.sign(&self.config.signing_key, &unsigned)?;
        Ok(unsigned.into_signed(signature))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ExchangeError> {
    serde_json::to_string(value).map_err(|e| ExchangeError::Encode(e.to_string()))
}
