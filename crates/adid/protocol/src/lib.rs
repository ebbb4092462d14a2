//! Protocol core of the adid operator.
//!
//! Per request the exchange handler runs `RECEIVED → VERIFIED → (READ |
//! WRITE) → RESPONDED`, or drops to the terminal `REJECTED` at any
//! verification or validation step. Requests are handled independently and
//! statelessly; all durable state lives in the caller's cookie jar, which the
//! transport layer presents as a request-scoped [`StoredState`] and receives
//! back as [`CookieWrite`] instructions.

#![deny(unsafe_code)]

mod config;
mod cookies;
mod handler;
mod issuer;

pub use config::OperatorConfig;
pub use cookies::{CookieWrite, StoredState};
pub use handler::{ExchangeError, ExchangeHandler, ExchangeOutcome, ProbeOutcome};
pub use issuer::IdentityIssuer;
