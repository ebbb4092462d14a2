//! Request-scoped cookie view and persistence instructions.
//!
//! The handler never touches a cookie header. The transport layer decodes
//! the jar into a [`StoredState`] before the call and applies the returned
//! [`CookieWrite`] instructions after it, which keeps the protocol core pure
//! and the persistence mechanics swappable.

use adid_model::{Identifier, Preferences};
use std::time::Duration;

/// What the browser's cookie jar currently holds for this operator.
#[derive(Clone, Debug, Default)]
pub struct StoredState {
    pub identifier: Option<Identifier>,
    pub preferences: Option<Preferences>,
    /// Raw value of the 3PC probe marker, if the browser returned it.
    pub probe_marker: Option<String>,
}

impl StoredState {
    /// First visit: nothing stored yet.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// An instruction to the transport layer's cookie codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CookieWrite {
    Set {
        name: &'static str,
        value: String,
        max_age: Duration,
    },
    Clear {
        name: &'static str,
    },
}

impl CookieWrite {
    pub fn set(name: &'static str, value: impl Into<String>, max_age: Duration) -> Self {
        Self::Set {
            name,
            value: value.into(),
            max_age,
        }
    }

    pub fn clear(name: &'static str) -> Self {
        Self::Clear { name }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Set { name, .. } | Self::Clear { name } => name,
        }
    }
}
