//! Market Data Types
//!
//! Raw vendor depth records, the normalized tick handed downstream, and the
//! normalizer that converts between them.

/// Raw vendor depth records.
pub mod raw;

/// Normalized tick types.
pub mod tick;

/// Vendor-to-canonical conversion.
pub mod normalizer;

pub use normalizer::{MalformedTick, normalize_depth, parse_exchange_time};
pub use raw::{DEPTH_LEVELS, DepthMarketData, OrderQueue};
pub use tick::{NormalizedTick, PriceLevel, QueueSnapshot, Side};
