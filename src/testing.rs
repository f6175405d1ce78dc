//! Test doubles that count every network call.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use crate::{
    credential::{Credential, MemoryStore},
    engine::Engine,
    error::{Error, Result},
    events::Event,
    gate::Gate,
    intermediary::TokenExchange,
    protocol::{
        auth::TokenResponse,
        web::{Device, Devices, PlayRequest, PlaybackState, Track},
    },
    remote::{Controller, Timings},
    session::Session,
    tokens::TokenManager,
    webapi::WebApi,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn valid_credential() -> Credential {
    Credential::new(
        "valid-access",
        "valid-refresh",
        SystemTime::now() + Duration::from_secs(3600),
    )
}

pub fn expired_credential() -> Credential {
    Credential::new(
        "stale-access",
        "old-refresh",
        UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    )
}

pub fn tokens(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: access_token.to_owned(),
        refresh_token: refresh_token.map(ToOwned::to_owned),
        expires_in: Duration::from_secs(expires_in),
    }
}

pub fn playback(uri: &str, name: &str, is_playing: bool) -> PlaybackState {
    PlaybackState {
        is_playing,
        progress_ms: Some(0),
        item: Some(Track {
            id: uri.rsplit(':').next().map(ToOwned::to_owned),
            uri: uri.to_owned(),
            name: name.to_owned(),
            duration_ms: 180_000,
            explicit: false,
            artists: Vec::new(),
            album: None,
        }),
        ..PlaybackState::default()
    }
}

/// Scripted intermediary. Refreshes can be held back to observe callers
/// piling up on a pending refresh.
#[derive(Default)]
pub struct FakeExchange {
    refreshes: Mutex<VecDeque<Result<TokenResponse>>>,
    exchanges: Mutex<VecDeque<Result<TokenResponse>>>,
    refresh_calls: AtomicUsize,
    held: AtomicBool,
    released: Notify,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_refresh(&self, response: Result<TokenResponse>) {
        lock(&self.refreshes).push_back(response);
    }

    pub fn push_exchange(&self, response: Result<TokenResponse>) {
        lock(&self.exchanges).push_back(response);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn hold_refresh(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_refresh(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn exchange(&self, _code: &str) -> Result<TokenResponse> {
        lock(&self.exchanges)
            .pop_front()
            .unwrap_or_else(|| Err(Error::exchange_failed("no scripted exchange")))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        loop {
            let released = self.released.notified();
            if !self.held.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        lock(&self.refreshes)
            .pop_front()
            .unwrap_or_else(|| Err(Error::refresh_failed("no scripted refresh")))
    }
}

/// In-memory provider with a device registry.
///
/// Transfers activate the target device and deactivate all others, unless
/// told to ignore them.
#[derive(Default)]
pub struct FakeWebApi {
    registry: Mutex<Vec<Device>>,
    playback: Mutex<Option<PlaybackState>>,
    resources: Mutex<HashMap<String, VecDeque<Value>>>,
    posts: Mutex<Vec<(String, Value)>>,
    failures: Mutex<VecDeque<Error>>,
    command_failures: Mutex<VecDeque<Error>>,
    commands: Mutex<Vec<String>>,
    tokens_seen: Mutex<Vec<String>>,
    ignore_transfers: AtomicBool,
    devices_calls: AtomicUsize,
    transfer_calls: AtomicUsize,
    playback_calls: AtomicUsize,
    total_calls: AtomicUsize,
}

impl FakeWebApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, id: &str, is_active: bool) {
        lock(&self.registry).push(Device {
            id: Some(id.to_owned()),
            is_active,
            name: id.to_owned(),
            ..Device::default()
        });
    }

    pub fn activate(&self, id: &str) {
        for device in lock(&self.registry).iter_mut() {
            device.is_active = device.has_id(id);
        }
    }

    pub fn deactivate_all(&self) {
        for device in lock(&self.registry).iter_mut() {
            device.is_active = false;
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        lock(&self.registry)
            .iter()
            .any(|device| device.has_id(id) && device.is_active)
    }

    pub fn ignore_transfers(&self) {
        self.ignore_transfers.store(true, Ordering::SeqCst);
    }

    pub fn set_playback(&self, playback: Option<PlaybackState>) {
        *lock(&self.playback) = playback;
    }

    /// Queues a response for `GET path`.
    pub fn respond(&self, path: &str, value: Value) {
        lock(&self.resources)
            .entry(path.to_owned())
            .or_default()
            .push_back(value);
    }

    /// Fails the next call of any kind.
    pub fn fail_next(&self, error: Error) {
        lock(&self.failures).push_back(error);
    }

    /// Fails the next playback command.
    pub fn fail_command(&self, error: Error) {
        lock(&self.command_failures).push_back(error);
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        lock(&self.posts).clone()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.tokens_seen).clone()
    }

    pub fn devices_calls(&self) -> usize {
        self.devices_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn playback_calls(&self) -> usize {
        self.playback_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn call(&self, token: &str) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.tokens_seen).push(token.to_owned());
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn command(&self, token: &str, command: String) -> Result<()> {
        self.call(token)?;
        if let Some(error) = lock(&self.command_failures).pop_front() {
            return Err(error);
        }
        lock(&self.commands).push(command);
        Ok(())
    }
}

#[async_trait]
impl WebApi for FakeWebApi {
    async fn devices(&self, token: &str) -> Result<Devices> {
        self.devices_calls.fetch_add(1, Ordering::SeqCst);
        self.call(token)?;
        Ok(Devices {
            devices: lock(&self.registry).clone(),
        })
    }

    async fn transfer_playback(&self, token: &str, device_id: &str, _play: bool) -> Result<()> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.call(token)?;
        if !self.ignore_transfers.load(Ordering::SeqCst) {
            self.activate(device_id);
        }
        Ok(())
    }

    async fn playback_state(&self, token: &str) -> Result<Option<PlaybackState>> {
        self.playback_calls.fetch_add(1, Ordering::SeqCst);
        self.call(token)?;
        Ok(lock(&self.playback).clone())
    }

    async fn play(&self, token: &str, device_id: &str, request: &PlayRequest) -> Result<()> {
        let body = serde_json::to_string(request)?;
        self.command(token, format!("play {device_id} {body}"))
    }

    async fn pause(&self, token: &str, device_id: &str) -> Result<()> {
        self.command(token, format!("pause {device_id}"))
    }

    async fn seek(&self, token: &str, device_id: &str, position: Duration) -> Result<()> {
        self.command(
            token,
            format!("seek {device_id} {}", position.as_millis()),
        )
    }

    async fn next(&self, token: &str, device_id: &str) -> Result<()> {
        self.command(token, format!("next {device_id}"))
    }

    async fn previous(&self, token: &str, device_id: &str) -> Result<()> {
        self.command(token, format!("previous {device_id}"))
    }

    async fn set_volume(&self, token: &str, device_id: &str, percent: u8) -> Result<()> {
        self.command(token, format!("volume {device_id} {percent}"))
    }

    async fn get(&self, token: &str, path: &str, _query: &[(&str, String)]) -> Result<Value> {
        self.call(token)?;
        lock(&self.resources)
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| Error::upstream(404, format!("no resource at {path}")))
    }

    async fn post(&self, token: &str, path: &str, body: &Value) -> Result<Value> {
        self.call(token)?;
        lock(&self.posts).push((path.to_owned(), body.clone()));
        Ok(lock(&self.resources)
            .get_mut(path)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Value::Null))
    }
}

/// Scripted playback engine.
pub struct FakeEngine {
    load_fails: bool,
    accepts: bool,
    ready_as: Option<String>,
    events: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    loads: AtomicUsize,
    disconnects: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            load_fails: false,
            accepts: true,
            ready_as: None,
            events: Mutex::new(None),
            loads: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_load() -> Self {
        Self {
            load_fails: true,
            ..Self::new()
        }
    }

    pub fn refusing() -> Self {
        Self {
            accepts: false,
            ..Self::new()
        }
    }

    /// An engine that announces `device_id` as ready when connecting.
    pub fn with_events(device_id: &str) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            ready_as: Some(device_id.to_owned()),
            events: Mutex::new(Some(sender)),
            ..Self::new()
        };
        (engine, receiver)
    }

    pub fn close_events(&self) {
        lock(&self.events).take();
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.tokens_seen).clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.load_fails {
            return Err(Error::internal("engine asset could not be loaded"));
        }
        Ok(())
    }

    async fn connect(&self, token: &str) -> Result<bool> {
        lock(&self.tokens_seen).push(token.to_owned());
        if let (Some(device_id), Some(events)) = (&self.ready_as, lock(&self.events).as_ref()) {
            let _ = events.send(Event::Ready {
                device_id: device_id.clone(),
            });
        }
        Ok(self.accepts)
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything behind a test controller.
pub struct Harness {
    pub session: Arc<Session>,
    pub tokens: Arc<TokenManager>,
    pub exchange: Arc<FakeExchange>,
    pub api: Arc<FakeWebApi>,
    pub engine: Arc<FakeEngine>,
}

/// A controller over fakes, logged in with a valid credential and using
/// the default timings.
pub fn controller(engine: FakeEngine) -> (Controller, Harness) {
    let (gate, harness) = gate(engine);
    let controller = Controller::new(
        gate,
        Box::new(Arc::clone(&harness.engine)),
        Timings::default(),
    );
    (controller, harness)
}

pub fn gate(engine: FakeEngine) -> (Arc<Gate>, Harness) {
    let session = Arc::new(Session::new());
    let exchange = Arc::new(FakeExchange::new());
    let api = Arc::new(FakeWebApi::new());
    let tokens = Arc::new(TokenManager::new(
        Arc::new(MemoryStore::with_credential(valid_credential())),
        exchange.clone(),
    ));
    let gate = Arc::new(Gate::new(
        Arc::clone(&tokens),
        api.clone(),
        Arc::clone(&session),
    ));

    let harness = Harness {
        session,
        tokens,
        exchange,
        api,
        engine: Arc::new(engine),
    };
    (gate, harness)
}
