//! Error handling for playdeck.
//!
//! Every fallible operation returns [`Result`], carrying an [`Error`] that
//! pairs an [`ErrorKind`] with the underlying details. The kinds follow the
//! life of a player session:
//!
//! * Credential failures: [`NoCredential`], [`Unauthenticated`],
//!   [`RefreshFailed`], [`ExchangeFailed`]
//! * Provider failures that are not about authentication: [`Upstream`]
//! * Device reconciliation: [`DeviceNotActive`], [`ActivationFailed`]
//! * Transport: [`TransitionDisallowed`]
//! * Playback engine: [`NotConnected`], [`SdkUnavailable`], [`NoToken`],
//!   [`InitError`], [`AuthError`], [`PremiumRequired`], [`PlaybackError`]
//!
//! # Example
//!
//! ```rust
//! use playdeck::error::{Error, ErrorKind, Result};
//!
//! fn volume(percent: u8) -> Result<u8> {
//!     if percent > 100 {
//!         return Err(Error::invalid_argument("volume must be between 0 and 100"));
//!     }
//!     Ok(percent)
//! }
//! ```
//!
//! [`NoCredential`]: ErrorKind::NoCredential
//! [`Unauthenticated`]: ErrorKind::Unauthenticated
//! [`RefreshFailed`]: ErrorKind::RefreshFailed
//! [`ExchangeFailed`]: ErrorKind::ExchangeFailed
//! [`Upstream`]: ErrorKind::Upstream
//! [`DeviceNotActive`]: ErrorKind::DeviceNotActive
//! [`ActivationFailed`]: ErrorKind::ActivationFailed
//! [`TransitionDisallowed`]: ErrorKind::TransitionDisallowed
//! [`NotConnected`]: ErrorKind::NotConnected
//! [`SdkUnavailable`]: ErrorKind::SdkUnavailable
//! [`NoToken`]: ErrorKind::NoToken
//! [`InitError`]: ErrorKind::InitError
//! [`AuthError`]: ErrorKind::AuthError
//! [`PremiumRequired`]: ErrorKind::PremiumRequired
//! [`PlaybackError`]: ErrorKind::PlaybackError

use std::fmt;

use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for playdeck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
///
/// Kinds are `Copy` so that they can double as the failure reason of the
/// device controller's state machine.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum ErrorKind {
    /// No credential is stored: the user is logged out.
    #[error("no credential")]
    NoCredential,

    /// No valid credential could be presented to the provider.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The intermediary did not renew the access token.
    #[error("token refresh failed")]
    RefreshFailed,

    /// The intermediary did not exchange the authorization code.
    #[error("token exchange failed")]
    ExchangeFailed,

    /// Provider-side failure that is not retried. Carries the HTTP status,
    /// or `None` when the request never got a response.
    #[error("upstream error{}", .0.map(|status| format!(" (status {status})")).unwrap_or_default())]
    Upstream(Option<u16>),

    /// The local device could not be confirmed as the active output.
    #[error("device not active")]
    DeviceNotActive,

    /// Transferring playback to the local device did not take effect.
    #[error("device activation failed")]
    ActivationFailed,

    /// The provider has marked the requested transition unavailable.
    #[error("transition disallowed")]
    TransitionDisallowed,

    /// The session never became connected.
    #[error("not connected")]
    NotConnected,

    /// The playback engine asset could not be loaded.
    #[error("playback engine unavailable")]
    SdkUnavailable,

    /// No access token was available to hand to the playback engine.
    #[error("no access token for playback engine")]
    NoToken,

    /// The playback engine failed to initialize or connect.
    #[error("playback engine initialization error")]
    InitError,

    /// The playback engine rejected the access token.
    #[error("playback engine authentication error")]
    AuthError,

    /// The account cannot stream to this device.
    #[error("premium required")]
    PremiumRequired,

    /// The playback engine failed to play the current item.
    #[error("playback error")]
    PlaybackError,

    /// A caller supplied an unusable value.
    #[error("invalid argument")]
    InvalidArgument,

    /// Local failure: configuration, storage, or a broken invariant.
    #[error("internal error")]
    Internal,
}

impl ErrorKind {
    /// The HTTP status carried by an [`Upstream`](Self::Upstream) kind.
    #[must_use]
    pub fn status(self) -> Option<u16> {
        match self {
            Self::Upstream(status) => status,
            _ => None,
        }
    }
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for a provider response with a non-success status.
    pub fn upstream<E>(status: u16, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Upstream(Some(status)), error)
    }

    pub fn no_credential<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NoCredential, error)
    }

    /// Creates an error for a missing or rejected credential.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::unauthenticated("access token rejected twice");
    /// assert_eq!(err.kind, ErrorKind::Unauthenticated);
    /// ```
    pub fn unauthenticated<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unauthenticated, error)
    }

    pub fn refresh_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::RefreshFailed, error)
    }

    pub fn exchange_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ExchangeFailed, error)
    }

    pub fn device_not_active<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeviceNotActive, error)
    }

    pub fn activation_failed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ActivationFailed, error)
    }

    pub fn transition_disallowed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::TransitionDisallowed, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::invalid_argument("volume must be between 0 and 100");
    /// assert_eq!(err.kind, ErrorKind::InvalidArgument);
    /// ```
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// The HTTP status of a provider failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.kind.status()
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::{InvalidData, InvalidInput};
        match err.kind() {
            InvalidInput | InvalidData => Self::invalid_argument(err),
            _ => Self::internal(err),
        }
    }
}

/// Converts HTTP client errors.
///
/// Status errors keep their status code. Everything else happened before a
/// response was read and becomes an upstream error without a status.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::internal(err);
        }

        let status = err.status().map(|status| status.as_u16());
        Self::new(ErrorKind::Upstream(status), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_exposed() {
        let err = Error::upstream(401, "token expired");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.kind, ErrorKind::Upstream(Some(401)));
        assert_eq!(err.to_string(), "upstream error (status 401): token expired");

        let err = Error::new(ErrorKind::Upstream(None), "connection reset");
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "upstream error: connection reset");
    }

    #[test]
    fn only_upstream_kinds_carry_status() {
        assert_eq!(Error::unauthenticated("expired").status(), None);
        assert_eq!(ErrorKind::RefreshFailed.status(), None);
    }
}
