//! Notifications from the local playback engine.
//!
//! The engine reports readiness, state changes and failures asynchronously.
//! Each notification is queued as an [`Event`] and handled in order by
//! [`Controller::dispatch`](crate::remote::Controller::dispatch). Delivery
//! order relative to the controller's own provider calls is not guaranteed.
//!
//! # Example
//!
//! ```rust
//! use playdeck::events::{EngineError, Event};
//!
//! fn describe(event: &Event) -> &'static str {
//!     match event {
//!         Event::Ready { .. } => "device registered",
//!         Event::NotReady { .. } => "device went offline",
//!         Event::StateChanged(_) => "playback changed",
//!         Event::Error(EngineError::Account, _) => "premium required",
//!         Event::Error(..) => "engine failure",
//!     }
//! }
//! ```

use crate::{error::ErrorKind, player::PlayerState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The engine registered with the provider under `device_id`.
    Ready { device_id: String },

    /// The device identified by `device_id` is no longer available.
    NotReady { device_id: String },

    /// Playback changed. `None` when playback moved to another device or
    /// stopped.
    StateChanged(Option<PlayerState>),

    /// The engine reported a failure with a message.
    Error(EngineError, String),
}

/// Failure categories reported by the playback engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineError {
    /// The engine could not be initialized, for instance because the
    /// environment lacks media support.
    Initialization,

    /// The access token was rejected.
    Authentication,

    /// The account cannot stream, usually for lack of a premium subscription.
    Account,

    /// An item could not be played. The engine stays usable.
    Playback,
}

impl EngineError {
    /// The failure reason the controller records for this error.
    #[must_use]
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::Initialization => ErrorKind::InitError,
            Self::Authentication => ErrorKind::AuthError,
            Self::Account => ErrorKind::PremiumRequired,
            Self::Playback => ErrorKind::PlaybackError,
        }
    }

    /// Whether the engine cannot continue after this error.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Playback)
    }
}
