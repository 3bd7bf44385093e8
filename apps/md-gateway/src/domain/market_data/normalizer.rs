//! Depth Normalizer
//!
//! Converts a raw vendor depth snapshot and its two best-price order queues
//! into a [`NormalizedTick`].
//!
//! # Validation
//!
//! A snapshot is rejected as [`MalformedTick`] when:
//!
//! - the exchange code is not a known venue
//! - the ticker is empty
//! - any price is NaN or infinite
//! - a non-zero timestamp does not parse as `YYYYMMDDHHMMSSmmm`
//! - a queue count is negative, or fewer entries were delivered than counted
//!
//! Depth levels where both price and quantity are zero are padding and are
//! skipped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::raw::{DEPTH_LEVELS, DepthMarketData, OrderQueue};
use super::tick::{NormalizedTick, PriceLevel, QueueSnapshot, Side};
use crate::domain::venue::Venue;

/// Decimal places kept on converted prices.
pub const PRICE_SCALE: u32 = 4;

// =============================================================================
// Errors
// =============================================================================

/// Reasons a vendor snapshot cannot be normalized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedTick {
    /// Exchange code does not map to a venue.
    #[error("unknown exchange code {0}")]
    UnknownExchange(u8),

    /// Ticker is empty.
    #[error("empty ticker")]
    EmptyTicker,

    /// A price field is NaN or infinite.
    #[error("non-finite {field}: {value}")]
    NonFinitePrice {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Exchange timestamp is not a valid `YYYYMMDDHHMMSSmmm` value.
    #[error("invalid exchange timestamp {0}")]
    InvalidTimestamp(i64),

    /// Queue count or maximum is negative.
    #[error("negative {side} queue count (count={count}, max={max_count})")]
    NegativeQueueCount {
        /// Queue side.
        side: Side,
        /// Reported count.
        count: i32,
        /// Reported maximum.
        max_count: i32,
    },

    /// Fewer queue entries were delivered than the count requires.
    #[error("{side} queue truncated: need {required}, got {delivered}")]
    TruncatedQueue {
        /// Queue side.
        side: Side,
        /// Entries required.
        required: usize,
        /// Entries delivered.
        delivered: usize,
    },
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize one vendor depth snapshot.
///
/// Reads exactly `min(count, max_count)` entries from each queue.
///
/// # Errors
///
/// Returns [`MalformedTick`] if the snapshot fails validation.
pub fn normalize_depth(
    raw: &DepthMarketData,
    bid_queue: OrderQueue<'_>,
    ask_queue: OrderQueue<'_>,
    received_at: DateTime<Utc>,
) -> Result<NormalizedTick, MalformedTick> {
    let venue = Venue::from_code(raw.exchange_id)
        .ok_or(MalformedTick::UnknownExchange(raw.exchange_id))?;

    let instrument_id = raw.ticker.trim();
    if instrument_id.is_empty() {
        return Err(MalformedTick::EmptyTicker);
    }

    let exchange_time = parse_exchange_time(raw.data_time)?;
    let bids = levels(&raw.bid, &raw.bid_qty, "bid")?;
    let asks = levels(&raw.ask, &raw.ask_qty, "ask")?;

    Ok(NormalizedTick {
        instrument_id: instrument_id.to_string(),
        venue,
        trading_day: exchange_time.map(|t| t.date()),
        exchange_time,
        received_at,
        last_price: price(raw.last_price, "last_price")?,
        pre_close_price: price(raw.pre_close_price, "pre_close_price")?,
        open_price: price(raw.open_price, "open_price")?,
        high_price: price(raw.high_price, "high_price")?,
        low_price: price(raw.low_price, "low_price")?,
        close_price: price(raw.close_price, "close_price")?,
        upper_limit_price: price(raw.upper_limit_price, "upper_limit_price")?,
        lower_limit_price: price(raw.lower_limit_price, "lower_limit_price")?,
        volume: raw.qty,
        turnover: price(raw.turnover, "turnover")?,
        trade_count: raw.trades_count,
        bid_queue: queue(Side::Bid, bid_queue, raw.bid[0], raw.bid_qty[0])?,
        ask_queue: queue(Side::Ask, ask_queue, raw.ask[0], raw.ask_qty[0])?,
        bids,
        asks,
    })
}

/// Convert a vendor float to a decimal price.
///
/// # Errors
///
/// Returns [`MalformedTick::NonFinitePrice`] for NaN or infinite values.
pub fn price(value: f64, field: &'static str) -> Result<Decimal, MalformedTick> {
    Decimal::try_from(value)
        .map(|d| d.round_dp(PRICE_SCALE).normalize())
        .map_err(|_| MalformedTick::NonFinitePrice { field, value })
}

/// Parse a `YYYYMMDDHHMMSSmmm` exchange timestamp.
///
/// Zero means the vendor sent no timestamp.
///
/// # Errors
///
/// Returns [`MalformedTick::InvalidTimestamp`] if a non-zero value does not
/// describe a real calendar time.
pub fn parse_exchange_time(data_time: i64) -> Result<Option<NaiveDateTime>, MalformedTick> {
    if data_time == 0 {
        return Ok(None);
    }

    let invalid = || MalformedTick::InvalidTimestamp(data_time);
    if data_time < 0 {
        return Err(invalid());
    }

    let millis = data_time % 1_000;
    let rest = data_time / 1_000;
    let second = rest % 100;
    let minute = (rest / 100) % 100;
    let hour = (rest / 10_000) % 100;
    let day = (rest / 1_000_000) % 100;
    let month = (rest / 100_000_000) % 100;
    let year = rest / 10_000_000_000;

    let field = |v: i64| u32::try_from(v).map_err(|_| invalid());
    let year = i32::try_from(year).map_err(|_| invalid())?;
    if !(1970..=9999).contains(&year) {
        return Err(invalid());
    }

    NaiveDate::from_ymd_opt(year, field(month)?, field(day)?)
        .and_then(|date| {
            date.and_hms_milli_opt(
                field(hour).ok()?,
                field(minute).ok()?,
                field(second).ok()?,
                field(millis).ok()?,
            )
        })
        .map(Some)
        .ok_or_else(invalid)
}

fn levels(
    prices: &[f64; DEPTH_LEVELS],
    quantities: &[i64; DEPTH_LEVELS],
    side: &'static str,
) -> Result<Vec<PriceLevel>, MalformedTick> {
    let mut out = Vec::with_capacity(DEPTH_LEVELS);
    for (&p, &quantity) in prices.iter().zip(quantities) {
        if p == 0.0 && quantity == 0 {
            continue;
        }
        out.push(PriceLevel {
            price: price(p, side)?,
            quantity,
        });
    }
    Ok(out)
}

fn queue(
    side: Side,
    source: OrderQueue<'_>,
    best_price: f64,
    best_quantity: i64,
) -> Result<QueueSnapshot, MalformedTick> {
    let negative = || MalformedTick::NegativeQueueCount {
        side,
        count: source.count,
        max_count: source.max_count,
    };
    let count = usize::try_from(source.count).map_err(|_| negative())?;
    let max_reportable = u32::try_from(source.max_count).map_err(|_| negative())?;

    let required = count.min(max_reportable as usize);
    let orders = source
        .entries
        .get(..required)
        .ok_or(MalformedTick::TruncatedQueue {
            side,
            required,
            delivered: source.entries.len(),
        })?
        .to_vec();

    Ok(QueueSnapshot {
        price: price(best_price, side.as_str())?,
        quantity: best_quantity,
        orders,
        max_reportable,
    })
}

// =============================================================================
// Tests
// =============================================================================
