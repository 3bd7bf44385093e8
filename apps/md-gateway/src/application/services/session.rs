//! Quote Session Manager
//!
//! Owns the single upstream session handle and drives its lifecycle.
//!
//! # Login Flow
//!
//! 1. Create the handle lazily through the factory with the current client id
//! 2. Register the callback receiver
//! 3. Apply the datagram buffer size when using UDP
//! 4. Log in; on a client id collision, bump the id by one, drop the handle
//!    and go back to step 1
//!
//! Collisions are retried up to `max_collision_retries` times. Any other
//! login failure is reported as [`ConnectOutcome::Rejected`] and leaves the
//! session disconnected.
//!
//! # Locking
//!
//! Caller operations serialize on the handle mutex. The phase sits behind a
//! separate lock so the transport's disconnect callback never waits on a
//! blocked login.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;

use crate::application::ports::{QuoteApi, QuoteApiFactory, SessionCallbacks, TransportError};
use crate::domain::session::{ApiError, ConnectOutcome, SessionPhase, Transport};
use crate::infrastructure::metrics::{self, ErrorKind};

/// Default number of client id collisions retried before giving up.
pub const DEFAULT_MAX_COLLISION_RETRIES: u32 = 16;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session handle could not be created.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every retry collided with another session's client id, or the client
    /// id space ran out.
    #[error("client id collision persisted after {attempts} attempts (last id {last_client_id})")]
    CollisionExhausted {
        /// Collisions seen.
        attempts: u32,
        /// Client id reached when retrying stopped.
        last_client_id: u32,
    },

    /// No session handle exists.
    #[error("no session handle; connect first")]
    NoSession,
}

// =============================================================================
// Settings
// =============================================================================

/// Login parameters for the session.
#[derive(Clone)]
pub struct SessionSettings {
    /// Initial client id.
    pub client_id: u32,
    /// Account user id.
    pub user_id: String,
    /// Account password.
    pub password: String,
    /// Endpoint host.
    pub host: String,
    /// Endpoint port.
    pub port: u16,
    /// Network transport.
    pub transport: Transport,
    /// Collisions retried before giving up.
    pub max_collision_retries: u32,
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("transport", &self.transport)
            .field("max_collision_retries", &self.max_collision_retries)
            .finish()
    }
}

// =============================================================================
// Status
// =============================================================================

/// Point-in-time view of the session for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Current phase.
    pub phase: SessionPhase,
    /// Client id the next login uses.
    pub client_id: u32,
    /// Transport in use.
    pub transport: Transport,
    /// Login requests sent.
    pub login_attempts: u64,
    /// Client id collisions seen.
    pub collisions: u64,
    /// Session handles created.
    pub handles_created: u64,
    /// Most recent refused login.
    pub last_login_error: Option<ApiError>,
}

// =============================================================================
// Session Manager
// =============================================================================

/// Drives the quote session state machine.
pub struct SessionManager {
    settings: SessionSettings,
    factory: Arc<dyn QuoteApiFactory>,
    callbacks: Weak<dyn SessionCallbacks>,
    handle: Mutex<Option<Box<dyn QuoteApi>>>,
    phase: RwLock<SessionPhase>,
    last_login_error: RwLock<Option<ApiError>>,
    client_id: AtomicU32,
    login_attempts: AtomicU64,
    collisions: AtomicU64,
    handles_created: AtomicU64,
}

impl SessionManager {
    /// Create a manager. No handle is created until the first connect.
    #[must_use]
    pub fn new(
        settings: SessionSettings,
        factory: Arc<dyn QuoteApiFactory>,
        callbacks: Weak<dyn SessionCallbacks>,
    ) -> Self {
        Self {
            client_id: AtomicU32::new(settings.client_id),
            settings,
            factory,
            callbacks,
            handle: Mutex::new(None),
            phase: RwLock::new(SessionPhase::Disconnected),
            last_login_error: RwLock::new(None),
            login_attempts: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            handles_created: AtomicU64::new(0),
        }
    }

    /// Connect and log in.
    ///
    /// Returns [`ConnectOutcome::AlreadyConnected`] without touching the
    /// endpoint when the session is already up.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Transport`] if a handle cannot be created
    /// - [`SessionError::CollisionExhausted`] if collisions outlast the cap
    pub fn connect(&self) -> Result<ConnectOutcome, SessionError> {
        let mut slot = self.handle.lock();
        if self.phase().is_connected() {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let transport = self.settings.transport;
        let mut collisions = 0_u32;

        loop {
            let api = self.ensure_handle(&mut slot)?;

            if let Some(buffer_mb) = transport.buffer_mb() {
                api.set_udp_buffer_size(buffer_mb);
            }

            self.login_attempts.fetch_add(1, Ordering::Relaxed);
            metrics::record_login_attempt();

            let client_id = self.client_id();
            let result = api.login(
                &self.settings.host,
                self.settings.port,
                &self.settings.user_id,
                &self.settings.password,
                transport,
            );

            match result {
                Ok(()) => {
                    self.set_phase(SessionPhase::LoggedIn);
                    *self.last_login_error.write() = None;
                    tracing::info!(
                        user_id = %self.settings.user_id,
                        client_id,
                        transport = %transport,
                        collisions,
                        "Login succeeded"
                    );
                    return Ok(ConnectOutcome::LoggedIn {
                        client_id,
                        collisions,
                    });
                }
                Err(err) if err.is_client_id_collision() => {
                    collisions += 1;
                    self.collisions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_collision();
                    *slot = None;

                    let Some(next_id) = client_id.checked_add(1) else {
                        tracing::error!(
                            attempts = collisions,
                            client_id,
                            "Client id space exhausted"
                        );
                        return Err(SessionError::CollisionExhausted {
                            attempts: collisions,
                            last_client_id: client_id,
                        });
                    };
                    self.client_id.store(next_id, Ordering::Relaxed);

                    if collisions > self.settings.max_collision_retries {
                        tracing::error!(
                            attempts = collisions,
                            last_client_id = next_id,
                            "Client id collisions exhausted retries"
                        );
                        return Err(SessionError::CollisionExhausted {
                            attempts: collisions,
                            last_client_id: next_id,
                        });
                    }

                    tracing::warn!(
                        code = err.code,
                        message = %err.message,
                        client_id = next_id,
                        "Client id in use, retrying with next id"
                    );
                }
                Err(err) => {
                    metrics::record_vendor_error(ErrorKind::Login, err.code);
                    tracing::error!(
                        code = err.code,
                        message = %err.message,
                        client_id,
                        "Login failed"
                    );
                    *self.last_login_error.write() = Some(err.clone());
                    return Ok(ConnectOutcome::Rejected(err));
                }
            }
        }
    }

    /// Log in unless already logged in.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn login(&self) -> Result<ConnectOutcome, SessionError> {
        if self.is_logged_in() {
            return Ok(ConnectOutcome::AlreadyConnected);
        }
        self.connect()
    }

    /// Log out. The session always ends disconnected.
    ///
    /// A refused logout is logged and otherwise ignored.
    pub fn logout(&self) {
        let mut slot = self.handle.lock();

        if self.is_logged_in() {
            if let Some(api) = slot.as_deref_mut() {
                match api.logout() {
                    Ok(()) => tracing::info!(
                        user_id = %self.settings.user_id,
                        client_id = self.client_id(),
                        "Logout succeeded"
                    ),
                    Err(err) => {
                        metrics::record_vendor_error(ErrorKind::Logout, err.code);
                        tracing::error!(
                            code = err.code,
                            message = %err.message,
                            "Logout failed"
                        );
                    }
                }
            }
        }

        self.set_phase(SessionPhase::Disconnected);
    }

    /// Mark the session disconnected after a transport drop.
    ///
    /// Only the phase changes; the handle is kept for the next connect.
    /// Returns the phase before the change.
    pub fn mark_disconnected(&self) -> SessionPhase {
        let previous = std::mem::replace(&mut *self.phase.write(), SessionPhase::Disconnected);
        metrics::set_session_phase(SessionPhase::Disconnected);
        previous
    }

    /// Drop the session handle, releasing the vendor session.
    ///
    /// Does nothing when no handle exists.
    pub fn release_handle(&self) {
        if self.handle.lock().take().is_some() {
            tracing::debug!(client_id = self.client_id(), "Session handle released");
        }
    }

    /// Run `f` against the live handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoSession`] when no handle exists.
    pub fn with_handle<R>(&self, f: impl FnOnce(&mut dyn QuoteApi) -> R) -> Result<R, SessionError> {
        let mut slot = self.handle.lock();
        let api = slot.as_deref_mut().ok_or(SessionError::NoSession)?;
        Ok(f(api))
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    /// Check whether the transport is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// Check whether the session is logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.phase().is_logged_in()
    }

    /// Client id the next login uses.
    #[must_use]
    pub fn client_id(&self) -> u32 {
        self.client_id.load(Ordering::Relaxed)
    }

    /// Check whether a session handle exists.
    #[must_use]
    pub fn has_handle(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Session settings.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Snapshot for health reporting.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase(),
            client_id: self.client_id(),
            transport: self.settings.transport,
            login_attempts: self.login_attempts.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            handles_created: self.handles_created.load(Ordering::Relaxed),
            last_login_error: self.last_login_error.read().clone(),
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.write() = phase;
        metrics::set_session_phase(phase);
    }

    fn ensure_handle<'s>(
        &self,
        slot: &'s mut Option<Box<dyn QuoteApi>>,
    ) -> Result<&'s mut (dyn QuoteApi + 'static), SessionError> {
        if slot.is_none() {
            let client_id = self.client_id();
            let mut api = self.factory.create(client_id).inspect_err(|e| {
                tracing::error!(client_id, error = %e, "Failed to create session handle");
            })?;
            api.register_callbacks(self.callbacks.clone());
            self.handles_created.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(client_id, "Session handle created");
            *slot = Some(api);
        }
        slot.as_deref_mut().ok_or(SessionError::NoSession)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .field("phase", &self.phase())
            .field("client_id", &self.client_id())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use mockall::Sequence;
    use mockall::predicate::eq;

    use super::*;
    use crate::application::ports::{MockQuoteApi, MockQuoteApiFactory};
    use crate::domain::session::CLIENT_ID_COLLISION;

    struct NoCallbacks;

    impl SessionCallbacks for NoCallbacks {
        fn on_disconnected(&self, _reason: i32) {}
        fn on_subscribe_market_data(
            &self,
            _ticker: Option<&crate::application::ports::SubscribeTicker>,
            _error: Option<&ApiError>,
            _is_last: bool,
        ) {
        }
        fn on_unsubscribe_market_data(
            &self,
            _ticker: Option<&crate::application::ports::SubscribeTicker>,
            _error: Option<&ApiError>,
            _is_last: bool,
        ) {
        }
        fn on_error(&self, _error: Option<&ApiError>, _is_last: bool) {}
        fn on_depth_market_data(
            &self,
            _data: &crate::domain::market_data::DepthMarketData,
            _bid_queue: crate::domain::market_data::OrderQueue<'_>,
            _ask_queue: crate::domain::market_data::OrderQueue<'_>,
        ) {
        }
    }

    fn settings(transport: Transport) -> SessionSettings {
        SessionSettings {
            client_id: 7,
            user_id: "trader".to_string(),
            password: "secret".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6002,
            transport,
            max_collision_retries: DEFAULT_MAX_COLLISION_RETRIES,
        }
    }

    fn manager(settings: SessionSettings, factory: MockQuoteApiFactory) -> SessionManager {
        let callbacks: Weak<dyn SessionCallbacks> = Weak::<NoCallbacks>::new();
        SessionManager::new(settings, Arc::new(factory), callbacks)
    }

    fn accepting_api() -> MockQuoteApi {
        let mut api = MockQuoteApi::new();
        api.expect_register_callbacks().return_const(());
        api.expect_login().returning(|_, _, _, _, _| Ok(()));
        api
    }

    #[test]
    fn tcp_login_skips_buffer_size() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().with(eq(7)).times(1).returning(|_| {
            let mut api = MockQuoteApi::new();
            api.expect_register_callbacks().return_const(());
            api.expect_set_udp_buffer_size().never();
            api.expect_login()
                .withf(|host, port, user, password, transport| {
                    host == "127.0.0.1"
                        && *port == 6002
                        && user == "trader"
                        && password == "secret"
                        && *transport == Transport::Tcp
                })
                .times(1)
                .returning(|_, _, _, _, _| Ok(()));
            Ok(Box::new(api))
        });

        let session = manager(settings(Transport::Tcp), factory);
        let outcome = session.connect().unwrap();

        assert_eq!(
            outcome,
            ConnectOutcome::LoggedIn {
                client_id: 7,
                collisions: 0
            }
        );
        assert!(session.is_logged_in());
        assert!(session.is_connected());
    }

    #[test]
    fn udp_sets_buffer_before_login() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().times(1).returning(|_| {
            let mut seq = Sequence::new();
            let mut api = MockQuoteApi::new();
            api.expect_register_callbacks()
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
            api.expect_set_udp_buffer_size()
                .with(eq(128))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
            api.expect_login()
                .withf(|_, _, _, _, transport| *transport == Transport::Udp { buffer_mb: 128 })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _, _, _| Ok(()));
            Ok(Box::new(api))
        });

        let session = manager(settings(Transport::Udp { buffer_mb: 128 }), factory);
        assert!(session.connect().unwrap().is_ready());
    }

    #[test]
    fn collision_bumps_client_id_and_recreates_handle() {
        let mut factory = MockQuoteApiFactory::new();
        let mut seq = Sequence::new();
        for id in [7, 8] {
            factory
                .expect_create()
                .with(eq(id))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| {
                    let mut api = MockQuoteApi::new();
                    api.expect_register_callbacks().return_const(());
                    api.expect_login()
                        .times(1)
                        .returning(|_, _, _, _, _| Err(ApiError::client_id_collision()));
                    Ok(Box::new(api))
                });
        }
        factory
            .expect_create()
            .with(eq(9))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Box::new(accepting_api())));

        let session = manager(settings(Transport::Tcp), factory);
        let outcome = session.connect().unwrap();

        assert_eq!(
            outcome,
            ConnectOutcome::LoggedIn {
                client_id: 9,
                collisions: 2
            }
        );
        assert_eq!(session.client_id(), 9);
        let status = session.status();
        assert_eq!(status.collisions, 2);
        assert_eq!(status.login_attempts, 3);
        assert_eq!(status.handles_created, 3);
    }

    #[test]
    fn collision_retries_are_bounded() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().times(3).returning(|_| {
            let mut api = MockQuoteApi::new();
            api.expect_register_callbacks().return_const(());
            api.expect_login()
                .returning(|_, _, _, _, _| Err(ApiError::new(CLIENT_ID_COLLISION, "dup")));
            Ok(Box::new(api))
        });

        let mut cfg = settings(Transport::Tcp);
        cfg.max_collision_retries = 2;
        let session = manager(cfg, factory);

        let err = session.connect().unwrap_err();
        assert_eq!(
            err,
            SessionError::CollisionExhausted {
                attempts: 3,
                last_client_id: 10
            }
        );
        assert!(!session.is_connected());
        assert!(!session.has_handle());
    }

    #[test]
    fn collisions_stop_at_top_of_client_id_space() {
        let mut factory = MockQuoteApiFactory::new();
        let mut seq = Sequence::new();
        for id in [u32::MAX - 1, u32::MAX] {
            factory
                .expect_create()
                .with(eq(id))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| {
                    let mut api = MockQuoteApi::new();
                    api.expect_register_callbacks().return_const(());
                    api.expect_login()
                        .times(1)
                        .returning(|_, _, _, _, _| Err(ApiError::client_id_collision()));
                    Ok(Box::new(api))
                });
        }

        let mut cfg = settings(Transport::Tcp);
        cfg.client_id = u32::MAX - 1;
        let session = manager(cfg, factory);

        assert_eq!(
            session.connect().unwrap_err(),
            SessionError::CollisionExhausted {
                attempts: 2,
                last_client_id: u32::MAX
            }
        );
        assert_eq!(session.client_id(), u32::MAX);
        assert!(!session.has_handle());
    }

    #[test]
    fn other_failure_is_rejected_without_retry() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().times(1).returning(|_| {
            let mut api = MockQuoteApi::new();
            api.expect_register_callbacks().return_const(());
            api.expect_login()
                .times(1)
                .returning(|_, _, _, _, _| Err(ApiError::new(11_000_350, "bad password")));
            Ok(Box::new(api))
        });

        let session = manager(settings(Transport::Tcp), factory);
        let outcome = session.connect().unwrap();

        assert_eq!(
            outcome,
            ConnectOutcome::Rejected(ApiError::new(11_000_350, "bad password"))
        );
        assert!(!session.is_connected());
        assert!(!session.is_logged_in());
        assert_eq!(session.client_id(), 7);
        assert!(session.status().last_login_error.is_some());
    }

    #[test]
    fn factory_failure_is_fatal() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().returning(|client_id| {
            Err(TransportError::CreateFailed {
                client_id,
                reason: "no runtime dir".to_string(),
            })
        });

        let session = manager(settings(Transport::Tcp), factory);
        assert!(matches!(
            session.connect(),
            Err(SessionError::Transport(TransportError::CreateFailed { client_id: 7, .. }))
        ));
    }

    #[test]
    fn connect_when_logged_in_is_noop() {
        let mut factory = MockQuoteApiFactory::new();
        factory
            .expect_create()
            .times(1)
            .returning(|_| Ok(Box::new(accepting_api())));

        let session = manager(settings(Transport::Tcp), factory);
        session.connect().unwrap();

        assert_eq!(session.connect().unwrap(), ConnectOutcome::AlreadyConnected);
        assert_eq!(session.login().unwrap(), ConnectOutcome::AlreadyConnected);
    }

    #[test]
    fn logout_always_disconnects() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().returning(|_| {
            let mut api = accepting_api();
            api.expect_logout()
                .times(1)
                .returning(|| Err(ApiError::new(3, "logout refused")));
            Ok(Box::new(api))
        });

        let session = manager(settings(Transport::Tcp), factory);
        session.connect().unwrap();
        session.logout();

        assert_eq!(session.phase(), SessionPhase::Disconnected);
        assert!(session.has_handle());
    }

    #[test]
    fn logout_when_disconnected_sends_nothing() {
        let factory = MockQuoteApiFactory::new();
        let session = manager(settings(Transport::Tcp), factory);
        session.logout();
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[test]
    fn disconnect_keeps_handle_for_reconnect() {
        let mut factory = MockQuoteApiFactory::new();
        factory.expect_create().times(1).returning(|_| {
            let mut api = MockQuoteApi::new();
            api.expect_register_callbacks().times(1).return_const(());
            api.expect_login().times(2).returning(|_, _, _, _, _| Ok(()));
            Ok(Box::new(api))
        });

        let session = manager(settings(Transport::Tcp), factory);
        session.connect().unwrap();

        assert_eq!(session.mark_disconnected(), SessionPhase::LoggedIn);
        assert!(!session.is_connected());
        assert!(session.has_handle());

        assert!(matches!(
            session.connect().unwrap(),
            ConnectOutcome::LoggedIn { client_id: 7, .. }
        ));
    }

    #[test]
    fn release_without_handle_is_noop() {
        let session = manager(settings(Transport::Tcp), MockQuoteApiFactory::new());
        session.release_handle();
        assert!(!session.has_handle());
    }

    #[test]
    fn with_handle_requires_session() {
        let session = manager(settings(Transport::Tcp), MockQuoteApiFactory::new());
        assert_eq!(
            session.with_handle(|_| ()).unwrap_err(),
            SessionError::NoSession
        );
    }

    #[test]
    fn settings_debug_redacts_password() {
        let rendered = format!("{:?}", settings(Transport::Tcp));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret"));
    }
}
