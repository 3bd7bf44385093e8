//! Tick Dispatcher
//!
//! Normalizes each vendor depth snapshot and hands it to the downstream
//! sink on the calling (transport) thread. There is no queueing: ticks reach
//! the sink in arrival order, one call per snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::application::ports::MarketDataSink;
use crate::domain::market_data::{DepthMarketData, MalformedTick, OrderQueue, normalize_depth};
use crate::infrastructure::metrics;

/// Tick counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchStats {
    /// Snapshots received.
    pub received: u64,
    /// Ticks handed to the sink.
    pub forwarded: u64,
    /// Snapshots dropped as malformed.
    pub malformed: u64,
    /// Receive time of the last forwarded tick.
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Normalizes snapshots and forwards them to one sink.
pub struct TickDispatcher {
    sink: Arc<dyn MarketDataSink>,
    received: AtomicU64,
    forwarded: AtomicU64,
    malformed: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

impl TickDispatcher {
    /// Create a dispatcher for `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MarketDataSink>) -> Self {
        Self {
            sink,
            received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            last_tick_at: RwLock::new(None),
        }
    }

    /// Normalize one snapshot and forward it.
    ///
    /// # Errors
    ///
    /// Returns the [`MalformedTick`] reason when the snapshot is dropped.
    /// The drop is already logged and counted.
    pub fn dispatch(
        &self,
        raw: &DepthMarketData,
        bid_queue: OrderQueue<'_>,
        ask_queue: OrderQueue<'_>,
    ) -> Result<(), MalformedTick> {
        let started = Instant::now();
        let received_at = Utc::now();
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::record_tick_received();

        let tick = match normalize_depth(raw, bid_queue, ask_queue, received_at) {
            Ok(tick) => tick,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                metrics::record_tick_malformed();
                tracing::warn!(
                    ticker = %raw.ticker,
                    exchange_id = raw.exchange_id,
                    error = %err,
                    "Dropping malformed depth snapshot"
                );
                return Err(err);
            }
        };

        self.sink.on_market_data(&tick);

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(received_at);
        metrics::record_tick_forwarded(tick.venue);
        metrics::record_dispatch_duration(started.elapsed());
        Ok(())
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            last_tick_at: *self.last_tick_at.read(),
        }
    }
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDispatcher")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
