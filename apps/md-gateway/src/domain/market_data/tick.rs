//! Normalized Tick
//!
//! The canonical quote record handed to downstream consumers.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::venue::Venue;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side.
    Bid,
    /// Sell side.
    Ask,
}

impl Side {
    /// Get the side name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price level of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting quantity at the level.
    pub quantity: i64,
}

/// Orders queued at the best price of one side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueueSnapshot {
    /// Best price of the side.
    pub price: Decimal,
    /// Total quantity at the best price.
    pub quantity: i64,
    /// Individual order quantities, queue order.
    pub orders: Vec<i64>,
    /// Maximum number of orders the source can report.
    pub max_reportable: u32,
}

impl QueueSnapshot {
    /// Number of orders captured.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Check whether the source reported more orders than it could deliver.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.max_reportable > 0 && self.orders.len() >= self.max_reportable as usize
    }
}

/// Normalized depth snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTick {
    /// Instrument ticker.
    pub instrument_id: String,
    /// Listing venue.
    pub venue: Venue,
    /// Trading day from the exchange timestamp.
    pub trading_day: Option<NaiveDate>,
    /// Exchange-local event time.
    pub exchange_time: Option<NaiveDateTime>,
    /// When the gateway received the event.
    pub received_at: DateTime<Utc>,
    /// Last traded price.
    pub last_price: Decimal,
    /// Previous session close.
    pub pre_close_price: Decimal,
    /// Session open.
    pub open_price: Decimal,
    /// Session high.
    pub high_price: Decimal,
    /// Session low.
    pub low_price: Decimal,
    /// Session close.
    pub close_price: Decimal,
    /// Daily upper limit.
    pub upper_limit_price: Decimal,
    /// Daily lower limit.
    pub lower_limit_price: Decimal,
    /// Cumulative volume.
    pub volume: i64,
    /// Cumulative traded value.
    pub turnover: Decimal,
    /// Cumulative trade count.
    pub trade_count: i64,
    /// Bid levels, best first.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    pub asks: Vec<PriceLevel>,
    /// Best-bid order queue.
    pub bid_queue: QueueSnapshot,
    /// Best-ask order queue.
    pub ask_queue: QueueSnapshot,
}

impl NormalizedTick {
    /// Best bid level.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask level.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Mid price, when both sides are present.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::TWO)
    }
}
