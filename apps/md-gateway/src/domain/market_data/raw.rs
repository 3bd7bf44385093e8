//! Vendor Depth Records
//!
//! Shapes of the depth snapshot delivered by the upstream quote endpoint.
//! These map field-for-field to the vendor callback payload and carry raw
//! floats and integer codes; nothing here is validated.

/// Number of depth levels the vendor reports per side.
pub const DEPTH_LEVELS: usize = 10;

/// Raw depth snapshot as delivered by the quote endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepthMarketData {
    /// Vendor exchange code (1 = Shanghai, 2 = Shenzhen).
    pub exchange_id: u8,
    /// Instrument ticker.
    pub ticker: String,
    /// Last traded price.
    pub last_price: f64,
    /// Previous session close.
    pub pre_close_price: f64,
    /// Session open.
    pub open_price: f64,
    /// Session high.
    pub high_price: f64,
    /// Session low.
    pub low_price: f64,
    /// Session close (zero while trading).
    pub close_price: f64,
    /// Daily upper price limit.
    pub upper_limit_price: f64,
    /// Daily lower price limit.
    pub lower_limit_price: f64,
    /// Exchange timestamp as `YYYYMMDDHHMMSSmmm`; zero when absent.
    pub data_time: i64,
    /// Cumulative traded volume.
    pub qty: i64,
    /// Cumulative traded value.
    pub turnover: f64,
    /// Cumulative number of trades.
    pub trades_count: i64,
    /// Bid prices, best first.
    pub bid: [f64; DEPTH_LEVELS],
    /// Ask prices, best first.
    pub ask: [f64; DEPTH_LEVELS],
    /// Bid quantities, aligned with `bid`.
    pub bid_qty: [i64; DEPTH_LEVELS],
    /// Ask quantities, aligned with `ask`.
    pub ask_qty: [i64; DEPTH_LEVELS],
}

/// Per-order quantities queued at the best price of one side.
///
/// `count` entries are valid; the source may report up to `max_count`.
/// Readers must never look past `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderQueue<'a> {
    /// Delivered quantities.
    pub entries: &'a [i64],
    /// Number of valid entries.
    pub count: i32,
    /// Maximum the source can report.
    pub max_count: i32,
}

impl<'a> OrderQueue<'a> {
    /// Create a queue view.
    #[must_use]
    pub const fn new(entries: &'a [i64], count: i32, max_count: i32) -> Self {
        Self {
            entries,
            count,
            max_count,
        }
    }

    /// A queue with no entries.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: &[],
            count: 0,
            max_count: 0,
        }
    }
}

impl Default for OrderQueue<'_> {
    fn default() -> Self {
        Self::empty()
    }
}
