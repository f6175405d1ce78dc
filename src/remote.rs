//! Playback device controller.
//!
//! The [`Controller`] drives the local playback [`Engine`] through its
//! lifecycle and keeps the engine's device the provider's active output.
//!
//! # States
//!
//! ```text
//! Uninitialized -> ScriptLoading -> Connecting -> Ready -> Active
//!                                                   |        |
//!                                                   +--------+--> Offline
//! any state -> Failed(reason)
//! ```
//!
//! * `start` waits for the session to connect, loads the engine and asks it
//!   to connect.
//! * The engine announces readiness with a device id, upon which the
//!   controller reconciles: it makes sure the provider treats that device as
//!   the active one.
//! * Engine failures move the controller to `Failed`, except playback
//!   errors which are only recorded for display.
//!
//! # Teardown
//!
//! [`Controller::disconnect`] returns to `Uninitialized` without network
//! activity. Reconciliations and commands that were already running finish,
//! but their results are discarded: every mutation is tagged with the epoch
//! it started in and dropped if a disconnect happened since.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::sync::mpsc;

use crate::{
    config::Config,
    engine::Engine,
    error::{Error, ErrorKind, Result},
    events::Event,
    gate::Gate,
    player::PlayerState,
    retry::Poll,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Uninitialized,
    ScriptLoading,
    Connecting,
    Ready,
    Active,
    Offline,
    Failed(ErrorKind),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::ScriptLoading => write!(f, "loading"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Active => write!(f, "active"),
            Self::Offline => write!(f, "offline"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Bounded waits of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    /// Polling for the session to connect.
    pub connect: Poll,

    /// Time given to the provider to propagate a playback transfer.
    pub settle: Duration,

    /// Wait before re-reading playback state after a skip.
    pub skip_recheck: Duration,
}

impl From<&Config> for Timings {
    fn from(config: &Config) -> Self {
        Self {
            connect: Poll::new(config.connect_interval, config.connect_attempts),
            settle: config.settle_delay,
            skip_recheck: config.skip_recheck_delay,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// A failure shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Point-in-time view of the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    pub device_id: Option<String>,
    pub player: PlayerState,
    pub error: Option<PlayerError>,
}

struct Inner {
    state: State,
    device_id: Option<String>,
    player: PlayerState,
    error: Option<PlayerError>,
    epoch: u64,
}

pub struct Controller {
    gate: Arc<Gate>,
    engine: Box<dyn Engine>,
    timings: Timings,
    inner: Mutex<Inner>,
}

impl Controller {
    #[must_use]
    pub fn new(gate: Arc<Gate>, engine: Box<dyn Engine>, timings: Timings) -> Self {
        Self {
            gate,
            engine,
            timings,
            inner: Mutex::new(Inner {
                state: State::Uninitialized,
                device_id: None,
                player: PlayerState::default(),
                error: None,
                epoch: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Applies `f` unless the controller was disconnected since `epoch`.
    fn update<F>(&self, epoch: u64, f: F) -> bool
    where
        F: FnOnce(&mut Inner),
    {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!("discarding result from before disconnect");
            return false;
        }
        f(&mut inner);
        true
    }

    fn set_state(&self, epoch: u64, state: State) -> Result<()> {
        if self.update(epoch, |inner| inner.state = state) {
            debug!("controller {state}");
            Ok(())
        } else {
            Err(Error::internal("controller disconnected"))
        }
    }

    /// Moves to `Failed(kind)` and returns the matching error.
    fn fail<E: fmt::Display>(&self, epoch: u64, kind: ErrorKind, cause: E) -> Error {
        let message = cause.to_string();
        error!("{kind}: {message}");
        self.update(epoch, |inner| {
            inner.state = State::Failed(kind);
            inner.error = Some(PlayerError {
                kind,
                message: message.clone(),
            });
        });
        Error::new(kind, message)
    }

    pub(crate) fn record_error(&self, epoch: u64, e: &Error) {
        self.update(epoch, |inner| {
            inner.error = Some(PlayerError {
                kind: e.kind,
                message: e.error.to_string(),
            });
        });
    }

    pub(crate) fn replace_player(&self, epoch: u64, player: PlayerState) {
        self.update(epoch, |inner| inner.player = player);
    }

    /// Brings the engine up.
    ///
    /// Waits for the session to connect, loads the engine, and asks it to
    /// connect with a valid token. Readiness arrives later as an event.
    ///
    /// # Errors
    ///
    /// Moves to `Failed` and returns, respectively:
    /// * `NotConnected` when the session does not connect in time
    /// * `SdkUnavailable` when the engine cannot be loaded
    /// * `NoToken` when no valid token can be obtained
    /// * `InitError` when the engine refuses to connect
    pub async fn start(&self) -> Result<()> {
        let epoch = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Uninitialized | State::Failed(_)) {
                return Err(Error::invalid_argument(format!(
                    "controller already started ({})",
                    inner.state
                )));
            }
            inner.error = None;
            inner.epoch
        };

        let session = self.gate.session();
        if !session.is_connected() {
            info!("waiting for session to connect");
            let connected = self
                .timings
                .connect
                .until(|| async move { Ok(session.is_connected()) })
                .await?;
            if !connected {
                return Err(self.fail(
                    epoch,
                    ErrorKind::NotConnected,
                    format!(
                        "session not connected after {} attempts",
                        self.timings.connect.attempts
                    ),
                ));
            }
        }

        self.set_state(epoch, State::ScriptLoading)?;
        if let Err(e) = self.engine.load().await {
            return Err(self.fail(epoch, ErrorKind::SdkUnavailable, e));
        }

        let credential = match self.gate.tokens().ensure_valid_token().await {
            Ok(credential) => credential,
            Err(e) => return Err(self.fail(epoch, ErrorKind::NoToken, e)),
        };

        self.set_state(epoch, State::Connecting)?;
        match self.engine.connect(credential.access_token()).await {
            Ok(true) => {
                debug!("engine connecting");
                Ok(())
            }
            Ok(false) => Err(self.fail(
                epoch,
                ErrorKind::InitError,
                "engine refused to connect",
            )),
            Err(e) => Err(self.fail(epoch, ErrorKind::InitError, e)),
        }
    }

    /// Consumes engine events until the channel closes.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        debug!("engine event channel closed");
    }

    /// Performs the state transition for one engine event.
    pub async fn dispatch(&self, event: Event) {
        match event {
            Event::Ready { device_id } => {
                {
                    let mut inner = self.lock();
                    if !matches!(inner.state, State::Connecting | State::Offline) {
                        warn!(
                            "ignoring ready notification for {device_id} while {}",
                            inner.state
                        );
                        return;
                    }
                    inner.device_id = Some(device_id.clone());
                    inner.state = State::Ready;
                }

                info!("device {device_id} ready");
                if let Err(e) = self.reconcile().await {
                    warn!("could not activate device {device_id}: {e}");
                }
            }

            Event::NotReady { device_id } => {
                let mut inner = self.lock();
                let local = inner.device_id.as_deref() == Some(device_id.as_str());
                let online = matches!(
                    inner.state,
                    State::Ready | State::Active | State::Failed(ErrorKind::ActivationFailed)
                );
                if local && online {
                    inner.device_id = None;
                    inner.state = State::Offline;
                    warn!("device {device_id} went offline");
                } else {
                    debug!("ignoring not ready notification for {device_id}");
                }
            }

            Event::StateChanged(player) => {
                self.lock().player = player.unwrap_or_default();
            }

            Event::Error(error, message) => {
                let kind = error.kind();
                let mut inner = self.lock();
                if error.is_fatal() {
                    error!("{kind}: {message}");
                    inner.state = State::Failed(kind);
                } else {
                    warn!("{kind}: {message}");
                }
                inner.error = Some(PlayerError { kind, message });
            }
        }
    }

    /// Makes the local device the provider's active output.
    ///
    /// Reconciling an already active device only reads the device registry.
    /// Otherwise playback is transferred without starting it, and after the
    /// settle interval the registry is read once more. There is no further
    /// retry.
    ///
    /// # Errors
    ///
    /// `ActivationFailed` when the device is not active after the transfer,
    /// `DeviceNotActive` when there is no local device, or the gate's error
    /// when the provider cannot be reached.
    pub async fn reconcile(&self) -> Result<()> {
        self.reconcile_device().await.map(|_| ())
    }

    /// Reconciles and returns the local device id.
    pub(crate) async fn reconcile_device(&self) -> Result<String> {
        let (epoch, device_id) = {
            let inner = self.lock();
            let reconcilable = matches!(
                inner.state,
                State::Ready | State::Active | State::Failed(ErrorKind::ActivationFailed)
            );
            match (&inner.device_id, reconcilable) {
                (Some(device_id), true) => (inner.epoch, device_id.clone()),
                _ => {
                    return Err(Error::device_not_active(format!(
                        "no local device ({})",
                        inner.state
                    )))
                }
            }
        };

        let result = self.activate(&device_id).await;

        self.update(epoch, |inner| {
            if inner.device_id.as_deref() != Some(device_id.as_str()) {
                return;
            }
            match &result {
                Ok(()) => {
                    if inner.state != State::Active {
                        info!("device {device_id} active");
                    }
                    inner.state = State::Active;
                }
                Err(e) => {
                    inner.state = State::Failed(ErrorKind::ActivationFailed);
                    inner.error = Some(PlayerError {
                        kind: ErrorKind::ActivationFailed,
                        message: e.to_string(),
                    });
                }
            }
        });

        result.map(|()| device_id)
    }

    async fn activate(&self, device_id: &str) -> Result<()> {
        if self.is_active(device_id).await? {
            trace!("device {device_id} already active");
            return Ok(());
        }

        debug!("transferring playback to {device_id}");
        self.gate
            .call(|api, token| {
                let device_id = device_id.to_owned();
                async move { api.transfer_playback(&token, &device_id, false).await }
            })
            .await?;

        if Poll::once(self.timings.settle)
            .until(|| self.is_active(device_id))
            .await?
        {
            Ok(())
        } else {
            Err(Error::activation_failed(format!(
                "device {device_id} not active after transfer"
            )))
        }
    }

    async fn is_active(&self, device_id: &str) -> Result<bool> {
        let devices = self
            .gate
            .call(|api, token| async move { api.devices(&token).await })
            .await?;

        Ok(devices
            .devices
            .iter()
            .any(|device| device.has_id(device_id) && device.is_active))
    }

    /// Tears the engine connection down. No network calls are made.
    pub fn disconnect(&self) {
        let previous = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.epoch += 1;
            inner.state = State::Uninitialized;
            inner.device_id = None;
            inner.player = PlayerState::default();
            inner.error = None;
            previous
        };

        if previous != State::Uninitialized {
            self.engine.disconnect();
            info!("disconnected from {previous} state");
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.lock().state
    }

    #[must_use]
    pub fn device_id(&self) -> Option<String> {
        self.lock().device_id.clone()
    }

    #[must_use]
    pub fn player_state(&self) -> PlayerState {
        self.lock().player.clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<PlayerError> {
        self.lock().error.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            state: inner.state,
            device_id: inner.device_id.clone(),
            player: inner.player.clone(),
            error: inner.error.clone(),
        }
    }

    pub(crate) fn gate(&self) -> &Gate {
        &self.gate
    }

    pub(crate) fn timings(&self) -> &Timings {
        &self.timings
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.disconnect();
    }
}
