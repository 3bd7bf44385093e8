//! Broadcast Channel Adapter
//!
//! Implements the downstream sink using a tokio broadcast channel for
//! fan-out to any number of async consumers.
//!
//! # Architecture
//!
//! The engine hands each normalized tick to exactly one sink. The
//! `BroadcastSink` is that sink: it wraps the tick in an `Arc` and publishes
//! it, so every receiver shares one allocation. Slow receivers lag and miss
//! ticks rather than blocking the transport thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::infrastructure::config::BroadcastSettings;
use crate::application::ports::MarketDataSink;
use crate::domain::market_data::NormalizedTick;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the broadcast channel.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Channel capacity in ticks.
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            capacity: settings.capacity,
        }
    }
}

// =============================================================================
// Broadcast Sink
// =============================================================================

/// Tick sink that fans out to broadcast receivers.
///
/// # Example
///
/// ```rust
/// use md_gateway::infrastructure::broadcast::{BroadcastConfig, BroadcastSink};
///
/// let sink = BroadcastSink::new(BroadcastConfig::default());
/// let mut rx = sink.subscribe();
/// assert_eq!(sink.receiver_count(), 1);
/// # drop(rx);
/// ```
#[derive(Debug)]
pub struct BroadcastSink {
    ticks_tx: broadcast::Sender<Arc<NormalizedTick>>,
    published: AtomicU64,
    unobserved: AtomicU64,
}

impl BroadcastSink {
    /// Create a sink with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            ticks_tx: broadcast::channel(config.capacity.max(1)).0,
            published: AtomicU64::new(0),
            unobserved: AtomicU64::new(0),
        }
    }

    /// Create a sink with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Publish a tick to all receivers.
    ///
    /// Returns the number of receivers, or `None` if there are none.
    pub fn publish(&self, tick: Arc<NormalizedTick>) -> Option<usize> {
        if let Ok(receivers) = self.ticks_tx.send(tick) {
            self.published.fetch_add(1, Ordering::Relaxed);
            Some(receivers)
        } else {
            self.unobserved.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Get a new tick receiver.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<NormalizedTick>> {
        self.ticks_tx.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.ticks_tx.receiver_count()
    }

    /// Get statistics about the channel.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            receivers: self.receiver_count(),
            published: self.published.load(Ordering::Relaxed),
            unobserved: self.unobserved.load(Ordering::Relaxed),
        }
    }
}

impl MarketDataSink for BroadcastSink {
    fn on_market_data(&self, tick: &NormalizedTick) {
        let _ = self.publish(Arc::new(tick.clone()));
    }
}

/// Shared broadcast sink reference.
pub type SharedBroadcastSink = Arc<BroadcastSink>;

/// Statistics about the broadcast channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BroadcastStats {
    /// Number of active receivers.
    pub receivers: usize,
    /// Ticks delivered to at least one receiver.
    pub published: u64,
    /// Ticks published while nobody was listening.
    pub unobserved: u64,
}

// =============================================================================
// Tests
// =============================================================================
