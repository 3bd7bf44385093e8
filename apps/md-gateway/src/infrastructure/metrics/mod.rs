//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Depth snapshots received, forwarded and dropped as malformed
//! - **Session**: Login attempts, client id collisions, disconnects, phase
//! - **Subscriptions**: Subscribe calls per venue and tracked instruments
//! - **Errors**: Vendor errors by kind
//! - **Latency**: Normalize-and-dispatch duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until a recorder is installed, so unit tests can
//! call them freely.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionPhase;
use crate::domain::venue::Venue;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Tick counters
    describe_counter!(
        "md_gateway_ticks_received_total",
        "Total depth snapshots received from the quote endpoint"
    );
    describe_counter!(
        "md_gateway_ticks_forwarded_total",
        "Total normalized ticks handed to the downstream sink"
    );
    describe_counter!(
        "md_gateway_ticks_malformed_total",
        "Total depth snapshots dropped as malformed"
    );

    // Session
    describe_counter!(
        "md_gateway_login_attempts_total",
        "Total login requests sent to the quote endpoint"
    );
    describe_counter!(
        "md_gateway_client_id_collisions_total",
        "Total logins refused because the client id was in use"
    );
    describe_counter!(
        "md_gateway_disconnects_total",
        "Total transport disconnects reported by the endpoint"
    );
    describe_gauge!(
        "md_gateway_session_phase",
        "Session phase (0 = disconnected, 1 = logged in)"
    );

    // Subscriptions
    describe_counter!(
        "md_gateway_subscribe_requests_total",
        "Total per-venue subscribe and unsubscribe calls"
    );
    describe_gauge!(
        "md_gateway_subscriptions",
        "Instruments currently requested per venue"
    );

    // Errors
    describe_counter!(
        "md_gateway_vendor_errors_total",
        "Total non-zero vendor errors by kind"
    );

    // Latency
    describe_histogram!(
        "md_gateway_tick_dispatch_seconds",
        "Time to normalize a snapshot and hand it to the sink"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for vendor error sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Login refused.
    Login,
    /// Logout refused.
    Logout,
    /// Subscription acknowledgment carried an error.
    Subscribe,
    /// Unsubscription acknowledgment carried an error.
    Unsubscribe,
    /// Generic asynchronous error.
    General,
}

impl ErrorKind {
    /// Get the label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::General => "general",
        }
    }
}

/// Metric labels for subscription request direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeAction {
    /// Subscribe request.
    Subscribe,
    /// Unsubscribe request.
    Unsubscribe,
}

impl SubscribeAction {
    /// Get the label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// Record a depth snapshot received from the endpoint.
pub fn record_tick_received() {
    counter!("md_gateway_ticks_received_total").increment(1);
}

/// Record a normalized tick handed downstream.
pub fn record_tick_forwarded(venue: Venue) {
    counter!(
        "md_gateway_ticks_forwarded_total",
        "venue" => venue.as_str()
    )
    .increment(1);
}

/// Record a malformed snapshot dropped by the normalizer.
pub fn record_tick_malformed() {
    counter!("md_gateway_ticks_malformed_total").increment(1);
}

/// Record a login request.
pub fn record_login_attempt() {
    counter!("md_gateway_login_attempts_total").increment(1);
}

/// Record a client id collision.
pub fn record_collision() {
    counter!("md_gateway_client_id_collisions_total").increment(1);
}

/// Record a transport disconnect.
pub fn record_disconnect() {
    counter!("md_gateway_disconnects_total").increment(1);
}

/// Update the session phase gauge.
pub fn set_session_phase(phase: SessionPhase) {
    let value = match phase {
        SessionPhase::Disconnected => 0.0,
        SessionPhase::LoggedIn => 1.0,
    };
    gauge!("md_gateway_session_phase").set(value);
}

/// Record a per-venue subscribe or unsubscribe call.
pub fn record_subscribe_request(action: SubscribeAction, venue: Venue, ok: bool) {
    counter!(
        "md_gateway_subscribe_requests_total",
        "action" => action.as_str(),
        "venue" => venue.as_str(),
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Update the tracked instrument count for a venue.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(venue: Venue, count: usize) {
    gauge!(
        "md_gateway_subscriptions",
        "venue" => venue.as_str()
    )
    .set(count as f64);
}

/// Record a non-zero vendor error.
pub fn record_vendor_error(kind: ErrorKind, code: i32) {
    counter!(
        "md_gateway_vendor_errors_total",
        "kind" => kind.as_str(),
        "code" => code.to_string()
    )
    .increment(1);
}

/// Record normalize-and-dispatch duration.
pub fn record_dispatch_duration(duration: Duration) {
    histogram!("md_gateway_tick_dispatch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
