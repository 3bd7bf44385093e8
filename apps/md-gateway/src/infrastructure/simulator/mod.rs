//! Simulated Quote Endpoint
//!
//! An in-process stand-in for the vendor quote library. It honours the same
//! handle contract as the real transport: blocking login, client-id
//! collisions, per-venue subscription calls, acknowledgments and depth
//! snapshots delivered on a separate thread.
//!
//! # Behaviour
//!
//! - Logins with a client id listed in `colliding_client_ids` fail with the
//!   collision code.
//! - Empty credentials are refused.
//! - A UDP login without a prior `set_udp_buffer_size` is refused.
//! - Each subscribed ticker gets a random-walk depth snapshot per interval.

mod feed;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::application::ports::{
    QuoteApi, QuoteApiFactory, SessionCallbacks, Transport, TransportError,
};
use crate::domain::session::ApiError;
use crate::domain::venue::Venue;
use crate::infrastructure::config::SimulatorSettings;

use feed::{Feed, FeedThread};

pub use feed::MAX_QUEUE_ORDERS;

// =============================================================================
// Vendor Codes
// =============================================================================

/// Login refused for bad credentials.
pub const INVALID_CREDENTIALS: i32 = 10_200_003;

/// Login refused for a transport misconfiguration.
pub const INVALID_TRANSPORT: i32 = 10_200_005;

/// Request sent on a handle that is not logged in.
pub const NOT_LOGGED_IN: i32 = 11_000_001;

/// Request carried no tickers.
pub const EMPTY_REQUEST: i32 = 11_000_002;

/// Unsubscription for a ticker that was never subscribed.
pub const TICKER_NOT_SUBSCRIBED: i32 = 11_200_003;

// =============================================================================
// Control
// =============================================================================

/// Observations and fault injection shared by a factory and its handles.
#[derive(Debug, Default)]
pub struct SimulatorControl {
    created: Mutex<Vec<u32>>,
    logins: AtomicU64,
    active: Mutex<Option<Weak<Feed>>>,
}

impl SimulatorControl {
    /// Client ids handles were created for, in order.
    #[must_use]
    pub fn created_client_ids(&self) -> Vec<u32> {
        self.created.lock().clone()
    }

    /// Successful logins so far.
    #[must_use]
    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Check whether a feed thread is currently live.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.active_feed().is_some_and(|feed| feed.is_running())
    }

    /// Subscribed tickers on the live feed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.active_feed().map_or(0, |feed| feed.subscription_count())
    }

    /// Drop the live connection, reporting `reason` through
    /// `on_disconnected`. Returns `false` when nothing is streaming.
    pub fn drop_connection(&self, reason: i32) -> bool {
        let Some(feed) = self.active_feed().filter(|feed| feed.is_running()) else {
            return false;
        };
        tracing::info!(reason, "Simulating connection drop");
        feed.disconnect(reason);
        true
    }

    fn active_feed(&self) -> Option<Arc<Feed>> {
        self.active.lock().as_ref().and_then(Weak::upgrade)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds simulated session handles.
#[derive(Debug, Clone)]
pub struct SimulatorFactory {
    tick_interval: Duration,
    colliding: Arc<HashSet<u32>>,
    control: Arc<SimulatorControl>,
}

impl SimulatorFactory {
    /// Create a factory from settings.
    #[must_use]
    pub fn new(settings: &SimulatorSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval,
            colliding: Arc::new(settings.colliding_client_ids.iter().copied().collect()),
            control: Arc::new(SimulatorControl::default()),
        }
    }

    /// Shared control handle.
    #[must_use]
    pub fn control(&self) -> Arc<SimulatorControl> {
        Arc::clone(&self.control)
    }
}

impl QuoteApiFactory for SimulatorFactory {
    fn create(&self, client_id: u32) -> Result<Box<dyn QuoteApi>, TransportError> {
        self.control.created.lock().push(client_id);
        tracing::debug!(client_id, "Creating simulated quote handle");
        Ok(Box::new(SimulatedQuoteApi {
            client_id,
            tick_interval: self.tick_interval,
            colliding: Arc::clone(&self.colliding),
            control: Arc::clone(&self.control),
            callbacks: None,
            udp_buffer_mb: None,
            feed: None,
        }))
    }
}

// =============================================================================
// Handle
// =============================================================================

/// One simulated session handle.
#[derive(Debug)]
pub struct SimulatedQuoteApi {
    client_id: u32,
    tick_interval: Duration,
    colliding: Arc<HashSet<u32>>,
    control: Arc<SimulatorControl>,
    callbacks: Option<Weak<dyn SessionCallbacks>>,
    udp_buffer_mb: Option<u32>,
    feed: Option<FeedThread>,
}

impl SimulatedQuoteApi {
    fn live_feed(&self) -> Result<&Arc<Feed>, ApiError> {
        self.feed
            .as_ref()
            .map(FeedThread::feed)
            .filter(|feed| feed.is_running())
            .ok_or_else(|| ApiError::new(NOT_LOGGED_IN, "session is not logged in"))
    }

    fn end_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.shutdown();
        }
    }
}

impl QuoteApi for SimulatedQuoteApi {
    fn register_callbacks(&mut self, callbacks: Weak<dyn SessionCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    fn set_udp_buffer_size(&mut self, buffer_mb: u32) {
        self.udp_buffer_mb = Some(buffer_mb);
    }

    fn login(
        &mut self,
        host: &str,
        port: u16,
        user_id: &str,
        password: &str,
        transport: Transport,
    ) -> Result<(), ApiError> {
        if self.colliding.contains(&self.client_id) {
            return Err(ApiError::client_id_collision());
        }
        if user_id.is_empty() || password.is_empty() {
            return Err(ApiError::new(INVALID_CREDENTIALS, "invalid user or password"));
        }
        if matches!(transport, Transport::Udp { .. }) && self.udp_buffer_mb.is_none() {
            return Err(ApiError::new(
                INVALID_TRANSPORT,
                "udp buffer size must be set before login",
            ));
        }

        self.end_feed();
        let feed = FeedThread::spawn(self.client_id, self.tick_interval, self.callbacks.clone())
            .map_err(|e| ApiError::new(INVALID_TRANSPORT, e.to_string()))?;
        *self.control.active.lock() = Some(Arc::downgrade(feed.feed()));
        self.feed = Some(feed);
        self.control.logins.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            client_id = self.client_id,
            host,
            port,
            transport = %transport,
            "Simulated login accepted"
        );
        Ok(())
    }

    fn logout(&mut self) -> Result<(), ApiError> {
        self.live_feed()?;
        self.end_feed();
        Ok(())
    }

    fn subscribe_market_data(&mut self, tickers: &[String], venue: Venue) -> Result<(), ApiError> {
        if tickers.is_empty() {
            return Err(ApiError::new(EMPTY_REQUEST, "no tickers in request"));
        }
        self.live_feed()?.subscribe(tickers, venue);
        Ok(())
    }

    fn unsubscribe_market_data(
        &mut self,
        tickers: &[String],
        venue: Venue,
    ) -> Result<(), ApiError> {
        if tickers.is_empty() {
            return Err(ApiError::new(EMPTY_REQUEST, "no tickers in request"));
        }
        self.live_feed()?.unsubscribe(tickers, venue);
        Ok(())
    }
}

impl Drop for SimulatedQuoteApi {
    fn drop(&mut self) {
        self.end_feed();
        tracing::debug!(client_id = self.client_id, "Simulated quote handle released");
    }
}

// =============================================================================
// Tests
// =============================================================================
