//! Trading Venues
//!
//! Venue enumeration and the identifier resolver that maps an instrument id
//! plus an optional explicit venue code to a venue.
//!
//! # Ticker Heuristics
//!
//! When no explicit venue code is supplied, only six-digit numeric tickers
//! are classified, by their leading digit:
//!
//! | Leading digit | Venue    | Typical instruments                         |
//! |---------------|----------|---------------------------------------------|
//! | 5, 6, 7, 9    | Shanghai | funds, A-shares, primary subscriptions, B-shares |
//! | 0, 1, 2, 3    | Shenzhen | A-shares, funds and bonds, B-shares, ChiNext |
//!
//! Everything else resolves to `None`. Coverage is intentionally partial and
//! callers drop unresolved instruments rather than failing.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Venue
// =============================================================================

/// Exchange an instrument is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    /// Shanghai Stock Exchange.
    #[serde(rename = "SH")]
    Shanghai,
    /// Shenzhen Stock Exchange.
    #[serde(rename = "SZ")]
    Shenzhen,
}

impl Venue {
    /// Get all venues.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Shanghai, Self::Shenzhen]
    }

    /// Numeric exchange code used on the vendor wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Shanghai => 1,
            Self::Shenzhen => 2,
        }
    }

    /// Decode a vendor exchange code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Shanghai),
            2 => Some(Self::Shenzhen),
            _ => None,
        }
    }

    /// Parse an explicit venue code (case-insensitive).
    ///
    /// Accepts the short codes (`SH`, `SZ`), the exchange abbreviations
    /// (`SSE`, `SZE`) and the ISO 10383 MICs (`XSHG`, `XSHE`).
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "SH" | "SSE" | "XSHG" => Some(Self::Shanghai),
            "SZ" | "SZE" | "XSHE" => Some(Self::Shenzhen),
            _ => None,
        }
    }

    /// Get the short venue code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolve the venue of an instrument.
///
/// A non-empty `explicit_venue` is parsed directly and wins over the ticker;
/// an unparsable code yields `None` without falling back to the heuristics.
/// An empty code means the venue is inferred from the ticker.
///
/// # Example
///
/// ```rust
/// use md_gateway::domain::venue::{Venue, resolve_venue};
///
/// assert_eq!(resolve_venue("600000", ""), Some(Venue::Shanghai));
/// assert_eq!(resolve_venue("600000", "SZ"), Some(Venue::Shenzhen));
/// assert_eq!(resolve_venue("bogus", ""), None);
/// ```
#[must_use]
pub fn resolve_venue(instrument_id: &str, explicit_venue: &str) -> Option<Venue> {
    if explicit_venue.trim().is_empty() {
        infer_from_ticker(instrument_id)
    } else {
        Venue::parse(explicit_venue)
    }
}

/// Infer the venue from a ticker's lexical pattern.
#[must_use]
pub fn infer_from_ticker(ticker: &str) -> Option<Venue> {
    let bytes = ticker.as_bytes();
    if bytes.len() != 6 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }

    match bytes[0] {
        b'5' | b'6' | b'7' | b'9' => Some(Venue::Shanghai),
        b'0'..=b'3' => Some(Venue::Shenzhen),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
