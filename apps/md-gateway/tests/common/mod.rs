//! Shared fixtures for integration tests.
//!
//! `RecordingFactory` builds handles that log every call into a shared
//! `Recorder`, answer logins from a script, and let a test fire callbacks
//! the way a vendor thread would.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use md_gateway::{
    ApiError, EngineConfig, InstrumentRequest, NormalizedTick, QuoteApi, QuoteApiFactory,
    SessionCallbacks, SessionSettings, Transport, TransportError, Venue,
};

/// One observed call on the fake transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(u32),
    RegisterCallbacks(u32),
    SetUdpBufferSize(u32, u32),
    Login(u32, Transport),
    Logout(u32),
    Subscribe(u32, Venue, Vec<String>),
    Unsubscribe(u32, Venue, Vec<String>),
    Release(u32),
}

/// Call log and login script shared by a factory and its handles.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    logins: Mutex<VecDeque<Result<(), ApiError>>>,
    subscribe_failures: Mutex<Vec<(Venue, ApiError)>>,
    callbacks: Mutex<Option<Weak<dyn SessionCallbacks>>>,
    fail_create: Mutex<bool>,
    login_hook: Mutex<Option<LoginHook>>,
}

type LoginHook = Arc<dyn Fn() + Send + Sync>;

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue login answers; unscripted logins succeed.
    pub fn script_logins(&self, results: impl IntoIterator<Item = Result<(), ApiError>>) {
        self.logins.lock().extend(results);
    }

    /// Make subscribe calls for `venue` fail synchronously.
    pub fn fail_subscribe(&self, venue: Venue, error: ApiError) {
        self.subscribe_failures.lock().push((venue, error));
    }

    /// Make the next `create` fail.
    pub fn fail_next_create(&self) {
        *self.fail_create.lock() = true;
    }

    /// Run `hook` inside every login, before it is answered.
    pub fn during_login(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.login_hook.lock() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::Create(_)))
    }

    pub fn logins(&self) -> usize {
        self.count(|c| matches!(c, Call::Login(..)))
    }

    /// Invoke the registered callbacks from the test thread.
    pub fn fire(&self, f: impl FnOnce(&dyn SessionCallbacks)) {
        let weak = self.callbacks.lock().clone().expect("callbacks registered");
        let callbacks = weak.upgrade().expect("engine alive");
        f(callbacks.as_ref());
    }

    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

/// Factory producing recording handles.
pub struct RecordingFactory(pub Arc<Recorder>);

impl QuoteApiFactory for RecordingFactory {
    fn create(&self, client_id: u32) -> Result<Box<dyn QuoteApi>, TransportError> {
        if std::mem::take(&mut *self.0.fail_create.lock()) {
            return Err(TransportError::CreateFailed {
                client_id,
                reason: "library not loaded".to_string(),
            });
        }
        self.0.push(Call::Create(client_id));
        Ok(Box::new(RecordingApi {
            client_id,
            recorder: Arc::clone(&self.0),
        }))
    }
}

struct RecordingApi {
    client_id: u32,
    recorder: Arc<Recorder>,
}

impl QuoteApi for RecordingApi {
    fn register_callbacks(&mut self, callbacks: Weak<dyn SessionCallbacks>) {
        self.recorder.push(Call::RegisterCallbacks(self.client_id));
        *self.recorder.callbacks.lock() = Some(callbacks);
    }

    fn set_udp_buffer_size(&mut self, buffer_mb: u32) {
        self.recorder
            .push(Call::SetUdpBufferSize(self.client_id, buffer_mb));
    }

    fn login(
        &mut self,
        _host: &str,
        _port: u16,
        _user_id: &str,
        _password: &str,
        transport: Transport,
    ) -> Result<(), ApiError> {
        self.recorder.push(Call::Login(self.client_id, transport));
        let hook = self.recorder.login_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.recorder.logins.lock().pop_front().unwrap_or(Ok(()))
    }

    fn logout(&mut self) -> Result<(), ApiError> {
        self.recorder.push(Call::Logout(self.client_id));
        Ok(())
    }

    fn subscribe_market_data(&mut self, tickers: &[String], venue: Venue) -> Result<(), ApiError> {
        self.recorder
            .push(Call::Subscribe(self.client_id, venue, tickers.to_vec()));
        self.recorder
            .subscribe_failures
            .lock()
            .iter()
            .find(|(v, _)| *v == venue)
            .map_or(Ok(()), |(_, err)| Err(err.clone()))
    }

    fn unsubscribe_market_data(
        &mut self,
        tickers: &[String],
        venue: Venue,
    ) -> Result<(), ApiError> {
        self.recorder
            .push(Call::Unsubscribe(self.client_id, venue, tickers.to_vec()));
        Ok(())
    }
}

impl Drop for RecordingApi {
    fn drop(&mut self) {
        self.recorder.push(Call::Release(self.client_id));
    }
}

/// Engine config for a session starting at `client_id`.
pub fn engine_config(
    client_id: u32,
    transport: Transport,
    instruments: Vec<InstrumentRequest>,
) -> EngineConfig {
    EngineConfig {
        session: SessionSettings {
            client_id,
            user_id: "trader".to_string(),
            password: "secret".to_string(),
            host: "10.0.0.1".to_string(),
            port: 6002,
            transport,
            max_collision_retries: 16,
        },
        instruments,
    }
}

/// Sink that keeps every tick it receives.
pub fn collecting_sink() -> (
    Arc<Mutex<Vec<NormalizedTick>>>,
    impl Fn(&NormalizedTick) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    (seen, move |tick: &NormalizedTick| {
        sink_seen.lock().push(tick.clone());
    })
}
