//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteApiFactory` / `QuoteApi`: the upstream quote endpoint
//! - `MarketDataSink`: the single downstream tick consumer
//!
//! ## Driver Ports (Inbound)
//!
//! - `SessionCallbacks`: events the endpoint pushes back into the gateway
//!
//! # Callback Contract
//!
//! Transports deliver callbacks on their own thread. A transport must never
//! invoke a callback from inside a caller-thread call on the same handle
//! (`login`, `subscribe_market_data`, ...); events raised while serving such
//! a call are queued and delivered afterwards.

use std::sync::Weak;

use thiserror::Error;

pub use crate::domain::market_data::{DepthMarketData, NormalizedTick, OrderQueue};
pub use crate::domain::session::{ApiError, Transport};
pub use crate::domain::venue::Venue;

// =============================================================================
// Errors
// =============================================================================

/// Fatal transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The vendor library could not build a session handle.
    #[error("failed to create quote api for client {client_id}: {reason}")]
    CreateFailed {
        /// Client id the handle was requested for.
        client_id: u32,
        /// Vendor-supplied reason.
        reason: String,
    },
}

// =============================================================================
// Upstream
// =============================================================================

/// Builds session handles for a client id.
#[cfg_attr(test, mockall::automock)]
pub trait QuoteApiFactory: Send + Sync {
    /// Create a fresh handle registered under `client_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the vendor library refuses to build one.
    fn create(&self, client_id: u32) -> Result<Box<dyn QuoteApi>, TransportError>;
}

/// A live vendor quote session handle.
///
/// Dropping the handle releases the vendor session.
#[cfg_attr(test, mockall::automock)]
pub trait QuoteApi: Send {
    /// Register the callback receiver for this handle.
    fn register_callbacks(&mut self, callbacks: Weak<dyn SessionCallbacks>);

    /// Set the datagram receive buffer size in megabytes.
    ///
    /// Must be called before `login` when using [`Transport::Udp`].
    fn set_udp_buffer_size(&mut self, buffer_mb: u32);

    /// Authenticate against the endpoint. Blocks until answered.
    ///
    /// # Errors
    ///
    /// Returns the vendor's [`ApiError`] when the login is refused.
    fn login(
        &mut self,
        host: &str,
        port: u16,
        user_id: &str,
        password: &str,
        transport: Transport,
    ) -> Result<(), ApiError>;

    /// End the authenticated session.
    ///
    /// # Errors
    ///
    /// Returns the vendor's [`ApiError`] when the logout is refused.
    fn logout(&mut self) -> Result<(), ApiError>;

    /// Request depth snapshots for tickers on one venue.
    ///
    /// # Errors
    ///
    /// Returns the vendor's [`ApiError`] if the request cannot be sent.
    fn subscribe_market_data(&mut self, tickers: &[String], venue: Venue) -> Result<(), ApiError>;

    /// Cancel depth snapshots for tickers on one venue.
    ///
    /// # Errors
    ///
    /// Returns the vendor's [`ApiError`] if the request cannot be sent.
    fn unsubscribe_market_data(&mut self, tickers: &[String], venue: Venue)
    -> Result<(), ApiError>;
}

/// Ticker echoed back in a subscription acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeTicker {
    /// Vendor exchange code.
    pub exchange_id: u8,
    /// Instrument ticker.
    pub ticker: String,
}

// =============================================================================
// Callbacks
// =============================================================================

/// Events delivered by a quote session handle.
pub trait SessionCallbacks: Send + Sync {
    /// Transport dropped; `reason` is the vendor reason code.
    fn on_disconnected(&self, reason: i32);

    /// Per-ticker subscription acknowledgment.
    fn on_subscribe_market_data(
        &self,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    );

    /// Per-ticker unsubscription acknowledgment.
    fn on_unsubscribe_market_data(
        &self,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    );

    /// Asynchronous error not tied to a request.
    fn on_error(&self, error: Option<&ApiError>, is_last: bool);

    /// Depth snapshot with the best-price order queues of both sides.
    fn on_depth_market_data(
        &self,
        data: &DepthMarketData,
        bid_queue: OrderQueue<'_>,
        ask_queue: OrderQueue<'_>,
    );
}

// =============================================================================
// Downstream
// =============================================================================

/// Receives every normalized tick, synchronously and in arrival order.
#[cfg_attr(test, mockall::automock)]
pub trait MarketDataSink: Send + Sync {
    /// Handle one tick. Runs on the transport's callback thread.
    fn on_market_data(&self, tick: &NormalizedTick);
}

impl<F> MarketDataSink for F
where
    F: Fn(&NormalizedTick) + Send + Sync,
{
    fn on_market_data(&self, tick: &NormalizedTick) {
        self(tick);
    }
}
