//! Diagnostics Relay
//!
//! Routes vendor acknowledgments, asynchronous errors and disconnects to
//! the log. Acknowledgments and errors never change session state; a
//! disconnect is the only event that does.
//!
//! Zero error codes mean success and are suppressed.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::application::ports::SubscribeTicker;
use crate::application::services::session::SessionManager;
use crate::domain::session::ApiError;
use crate::infrastructure::metrics::{self, ErrorKind};

/// Most recent vendor error seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Error source.
    pub kind: &'static str,
    /// Vendor code.
    pub code: i32,
    /// Vendor message.
    pub message: String,
    /// Ticker the error refers to, if any.
    pub ticker: Option<String>,
    /// When the relay saw it.
    pub at: DateTime<Utc>,
}

/// Relay counters for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DiagnosticsStats {
    /// Non-zero vendor errors seen.
    pub errors: u64,
    /// Transport disconnects seen.
    pub disconnects: u64,
    /// Most recent vendor error.
    pub last_error: Option<ErrorRecord>,
}

/// Logs vendor diagnostics and applies disconnects to the session.
#[derive(Debug, Default)]
pub struct DiagnosticsRelay {
    errors: AtomicU64,
    disconnects: AtomicU64,
    last_error: RwLock<Option<ErrorRecord>>,
}

impl DiagnosticsRelay {
    /// Create a relay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscription acknowledgment for one ticker.
    pub fn subscribe_ack(
        &self,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    ) {
        self.ack(ErrorKind::Subscribe, ticker, error, is_last);
    }

    /// Unsubscription acknowledgment for one ticker.
    pub fn unsubscribe_ack(
        &self,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    ) {
        self.ack(ErrorKind::Unsubscribe, ticker, error, is_last);
    }

    /// Asynchronous error not tied to a request.
    pub fn error(&self, error: Option<&ApiError>, is_last: bool) {
        let Some(err) = error.filter(|e| !e.is_success()) else {
            return;
        };
        tracing::error!(
            code = err.code,
            message = %err.message,
            is_last,
            "Quote endpoint error"
        );
        self.remember(ErrorKind::General, err, None);
    }

    /// Transport disconnect; marks the session disconnected.
    pub fn disconnected(&self, session: &SessionManager, reason: i32) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        metrics::record_disconnect();
        let previous = session.mark_disconnected();
        tracing::warn!(
            reason,
            previous_phase = %previous,
            client_id = session.client_id(),
            "Quote endpoint disconnected"
        );
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DiagnosticsStats {
        DiagnosticsStats {
            errors: self.errors.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }

    fn ack(
        &self,
        kind: ErrorKind,
        ticker: Option<&SubscribeTicker>,
        error: Option<&ApiError>,
        is_last: bool,
    ) {
        let Some(err) = error.filter(|e| !e.is_success()) else {
            tracing::trace!(
                ticker = ticker.map_or("null", |t| t.ticker.as_str()),
                kind = kind.as_str(),
                is_last,
                "Market data request acknowledged"
            );
            return;
        };

        let name = ticker.map_or("null", |t| t.ticker.as_str());
        tracing::error!(
            ticker = name,
            kind = kind.as_str(),
            code = err.code,
            message = %err.message,
            is_last,
            "Market data request rejected"
        );
        self.remember(kind, err, ticker.map(|t| t.ticker.clone()));
    }

    fn remember(&self, kind: ErrorKind, err: &ApiError, ticker: Option<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_vendor_error(kind, err.code);
        *self.last_error.write() = Some(ErrorRecord {
            kind: kind.as_str(),
            code: err.code,
            message: err.message.clone(),
            ticker,
            at: Utc::now(),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
