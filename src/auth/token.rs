//! OAuth token record
//!
//! The on-disk representation is a 1:1 serialization of [`Token`] and stays
//! byte-compatible with token files seeded by external authorization tooling.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// One OAuth2 session grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Short-lived bearer access token
    pub access_token: String,

    /// Longer-lived refresh token; rotates on every refresh
    pub refresh_token: String,

    /// Absolute expiry as Unix epoch seconds. A float so records written
    /// with sub-second precision by other tooling round-trip unchanged.
    pub expires_at: f64,

    /// Token type (always "Bearer" for Schwab)
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl Token {
    /// Build a token from a token-endpoint response, anchoring the relative
    /// `expires_in` to an absolute timestamp at the moment of receipt.
    #[must_use]
    pub fn from_response(response: TokenResponse, refresh_token: String) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: now_epoch() + response.expires_in as f64,
            token_type: response.token_type.unwrap_or_else(default_token_type),
        }
    }

    /// Check if the token expires within the given safety margin.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        now_epoch() + margin.as_secs_f64() >= self.expires_at
    }

    /// Time until actual expiry, if any remains.
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let remaining = self.expires_at - now_epoch();
        (remaining > 0.0).then(|| Duration::from_secs_f64(remaining))
    }
}

/// Success body of the token endpoint
///
/// `scope` and `id_token` are also present on some grants but unused here.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// Token type, usually "Bearer"
    #[serde(default)]
    pub token_type: Option<String>,
    /// Relative expiry in seconds (Schwab sends 1800)
    pub expires_in: u64,
    /// Rotated refresh token. Optional in the wire format; a missing value
    /// on a refresh grant is treated as a decode failure by the store.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Current time as Unix epoch seconds
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
