//! Token responses from the trusted intermediary.
//!
//! The intermediary holds the client secret and relays the provider's token
//! endpoint. A successful exchange looks like:
//!
//! ```json
//! {
//!     "access_token": "BQD...",
//!     "refresh_token": "AQC...",
//!     "expires_in": 3600
//! }
//! ```
//!
//! Refresh responses may omit `refresh_token` when the provider does not
//! rotate it. Failures carry either `{"message": ...}` or the provider's
//! `{"error": ..., "error_description": ...}`.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// Tokens issued by an exchange or refresh.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Redact)]
pub struct TokenResponse {
    #[redact]
    pub access_token: String,

    /// Absent or empty when the provider did not rotate the refresh token.
    #[redact]
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in: Duration,
}

/// Failure body returned by the intermediary.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, &self.error, &self.error_description) {
            (Some(message), _, _) => write!(f, "{message}"),
            (None, Some(error), Some(description)) => write!(f, "{error}: {description}"),
            (None, Some(error), None) => write!(f, "{error}"),
            (None, None, Some(description)) => write!(f, "{description}"),
            (None, None, None) => write!(f, "no details"),
        }
    }
}

#[derive(Serialize)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
}

#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}
