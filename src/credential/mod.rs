//! Authorization for the audio services
//!
//! The recognizer and the synthesizer both need a short-lived bearer token
//! and the service region. This module provides:
//! - `Credential`, the decoded token with its expiry
//! - `CredentialCache`, the process-scoped single-flight cache both sessions share
//! - `HttpCredentialSource` (client side) and `StsIssuer` (server side)

mod cache;
mod source;
pub mod token;

pub use cache::{Clock, CredentialCache, CredentialSource, SystemClock};
pub use source::{HttpCredentialSource, StsIssuer};
pub use token::{credential_is_valid, decode_expiry, decode_expiry_ms};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Token and region as returned by the issuing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub region: String,
}

/// A time-limited authorization for the audio services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token
    pub token: String,

    /// Service region (e.g. "westeurope")
    pub region: String,

    /// Decoded `exp` claim in seconds since the epoch (`None` if malformed)
    pub expires_at: Option<i64>,

    expires_at_ms: Option<i64>,
}

impl Credential {
    pub fn new(token: impl Into<String>, region: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at_ms = decode_expiry_ms(&token);
        Self {
            token,
            region: region.into(),
            expires_at: expires_at_ms.map(|ms| ms.div_euclid(1000)),
            expires_at_ms,
        }
    }

    /// Valid only if the expiry is strictly after `now_ms`
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|exp_ms| exp_ms > now_ms)
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

impl From<IssuedToken> for Credential {
    fn from(issued: IssuedToken) -> Self {
        Self::new(issued.token, issued.region)
    }
}
