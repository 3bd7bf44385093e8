//! Market Data Engine
//!
//! Host-facing facade that wires the session manager, subscription batcher,
//! tick dispatcher and diagnostics relay together, and receives the
//! transport's callbacks.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = MdEngine::load(config, factory, Arc::new(|tick: &NormalizedTick| {
//!     println!("{} {}", tick.instrument_id, tick.last_price);
//! }));
//! engine.start()?;
//! engine.wait_for_stop();
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::application::ports::{
    MarketDataSink, QuoteApiFactory, SessionCallbacks, SubscribeTicker,
};
use crate::application::services::batcher::{BatchReport, SubscriptionBatcher};
use crate::application::services::diagnostics::{DiagnosticsRelay, DiagnosticsStats};
use crate::application::services::dispatcher::{DispatchStats, TickDispatcher};
use crate::application::services::session::{
    SessionError, SessionManager, SessionSettings, SessionStatus,
};
use crate::domain::market_data::{DepthMarketData, OrderQueue};
use crate::domain::session::{ApiError, ConnectOutcome, SessionPhase};
use crate::domain::subscription::{InstrumentRequest, SubscriptionStats};

// =============================================================================
// Configuration
// =============================================================================

/// Everything the engine needs at load time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Session login parameters.
    pub session: SessionSettings,
    /// Instruments subscribed by [`MdEngine::start`].
    pub instruments: Vec<InstrumentRequest>,
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Engine run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Loaded, not started.
    #[default]
    Idle,
    /// Started.
    Running,
    /// Stopped.
    Stopped,
}

/// Full engine status for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// Run state.
    pub lifecycle: Lifecycle,
    /// Session state and counters.
    pub session: SessionStatus,
    /// Requested instruments per venue.
    pub subscriptions: SubscriptionStats,
    /// Tick counters.
    pub ticks: DispatchStats,
    /// Vendor error counters.
    pub diagnostics: DiagnosticsStats,
}

// =============================================================================
// Engine
// =============================================================================

/// Market data engine for one quote session.
pub struct MdEngine {
    session: SessionManager,
    batcher: SubscriptionBatcher,
    dispatcher: TickDispatcher,
    diagnostics: DiagnosticsRelay,
    instruments: Vec<InstrumentRequest>,
    lifecycle: Mutex<Lifecycle>,
    stopped: Condvar,
}

impl MdEngine {
    /// Build an engine. No connection is made until `connect` or `start`.
    #[must_use]
    pub fn load(
        config: EngineConfig,
        factory: Arc<dyn QuoteApiFactory>,
        sink: Arc<dyn MarketDataSink>,
    ) -> Arc<Self> {
        tracing::info!(
            client_id = config.session.client_id,
            host = %config.session.host,
            port = config.session.port,
            transport = %config.session.transport,
            instruments = config.instruments.len(),
            "Market data engine loaded"
        );

        Arc::new_cyclic(|engine: &Weak<Self>| {
            let callbacks: Weak<dyn SessionCallbacks> = engine.clone();
            Self {
                session: SessionManager::new(config.session, factory, callbacks),
                batcher: SubscriptionBatcher::new(),
                dispatcher: TickDispatcher::new(sink),
                diagnostics: DiagnosticsRelay::new(),
                instruments: config.instruments,
                lifecycle: Mutex::new(Lifecycle::Idle),
                stopped: Condvar::new(),
            }
        })
    }

    /// Connect and log in.
    ///
    /// The vendor API is synchronous; `_timeout_hint` is accepted for
    /// interface compatibility and ignored.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::connect`].
    pub fn connect(&self, _timeout_hint: Duration) -> Result<ConnectOutcome, SessionError> {
        self.session.connect()
    }

    /// Log in unless already logged in. `_timeout_hint` is ignored.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::connect`].
    pub fn login(&self, _timeout_hint: Duration) -> Result<ConnectOutcome, SessionError> {
        self.session.login()
    }

    /// Log out; the session always ends disconnected.
    pub fn logout(&self) {
        self.session.logout();
    }

    /// Drop the session handle.
    pub fn release(&self) {
        self.session.release_handle();
    }

    /// Subscribe instruments, one upstream call per venue.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if no session handle exists.
    pub fn subscribe(&self, instruments: &[InstrumentRequest]) -> Result<BatchReport, SessionError> {
        self.batcher.subscribe(&self.session, instruments)
    }

    /// Unsubscribe instruments, one upstream call per venue.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] if no session handle exists.
    pub fn unsubscribe(
        &self,
        instruments: &[InstrumentRequest],
    ) -> Result<BatchReport, SessionError> {
        self.batcher.unsubscribe(&self.session, instruments)
    }

    /// Start the engine: log in and subscribe the configured instruments.
    ///
    /// A refused login is returned as [`ConnectOutcome::Rejected`] and
    /// nothing is subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on a fatal transport error or exhausted
    /// collision retries.
    pub fn start(&self) -> Result<ConnectOutcome, SessionError> {
        *self.lifecycle.lock() = Lifecycle::Running;
        tracing::info!("Market data engine starting");

        let outcome = self.session.login()?;
        if !outcome.is_ready() {
            return Ok(outcome);
        }

        if !self.instruments.is_empty() {
            let report = self.subscribe(&self.instruments)?;
            tracing::info!(
                calls = report.calls(),
                unresolved = report.unresolved.len(),
                failures = report.failures.len(),
                "Configured instruments subscribed"
            );
        }
        Ok(outcome)
    }

    /// Stop the engine: log out, release the handle and wake waiters.
    ///
    /// Calling it again does nothing.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Stopped {
            return;
        }

        self.session.logout();
        self.session.release_handle();
        self.batcher.clear();

        *lifecycle = Lifecycle::Stopped;
        self.stopped.notify_all();
        tracing::info!("Market data engine stopped");
    }

    /// Block until [`stop`](Self::stop) has run.
    pub fn wait_for_stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        while *lifecycle != Lifecycle::Stopped {
            self.stopped.wait(&mut lifecycle);
        }
    }

    /// Block until stopped or `timeout` elapses. Returns `true` if stopped.
    #[must_use]
    pub fn wait_for_stop_timeout(&self, timeout: Duration) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Stopped {
            let _ = self.stopped.wait_while_for(
                &mut lifecycle,
                |state| *state != Lifecycle::Stopped,
                timeout,
            );
        }
        *lifecycle == Lifecycle::Stopped
    }

    /// Run state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Session phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Check whether the session is logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    /// Client id the next login uses.
    #[must_use]
    pub fn client_id(&self) -> u32 {
        self.session.client_id()
    }

    /// Check whether a session handle exists.
    #[must_use]
    pub fn has_session_handle(&self) -> bool {
        self.session.has_handle()
    }

    /// Full status snapshot.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            lifecycle: self.lifecycle(),
            session: self.session.status(),
            subscriptions: self.batcher.stats(),
            ticks: self.dispatcher.stats(),
            diagnostics: self.diagnostics.stats(),
        }
    }
}

impl SessionCallbacks for MdEngine {
    fn on_disconnected(&self, reason: i32) {
        self.diagnostics.disconnected(&self.session, reason);
    }

    fn on_subscribe_market_data(
        &self,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    ) {
        self.diagnostics.subscribe_ack(ticker, error, is_last);
    }

    fn on_unsubscribe_market_data(
        &self,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    ) {
        self.diagnostics.unsubscribe_ack(ticker, error, is_last);
    }

    fn on_error(&self, error: Option<&ApiError>, is_last: bool) {
        self.diagnostics.error(error, is_last);
    }

    fn on_depth_market_data(
        &self,
        data: &DepthMarketData,
        bid_queue: OrderQueue<'_>,
        ask_queue: OrderQueue<'_>,
    ) {
        // Malformed snapshots are logged and counted by the dispatcher.
        let _ = self.dispatcher.dispatch(data, bid_queue, ask_queue);
    }
}

impl std::fmt::Debug for MdEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdEngine")
            .field("session", &self.session)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
