//! Core identifiers and fixed-point numeric types shared across the market-data plane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue-agnostic symbol identifier. The display-name mapping (`EXCHSYM(DISPLAY)`
/// from the connector configuration) lives with the embedding application, not here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub u32);

impl Symbol {
    /// Construct a symbol from a raw id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYM_{}", self.0)
    }
}

/// Identifies the venue/provider an order book or trade originated from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub u32);

impl ProviderId {
    /// Construct a provider id from a raw id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PROVIDER_{}", self.0)
    }
}

/// Which side of the book a level or delta belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side (bid).
    Bid,
    /// Sell side (ask/offer).
    Ask,
}

/// Number of decimal places a price or size is quoted at. Immutable for the
/// lifetime of the book/level that carries it (§3 invariant).
pub type DecimalPlaces = u8;

/// Fixed-point price, stored as an integer number of ticks at some externally
/// tracked `DecimalPlaces`. Two prices are only comparable when scaled at the
/// same decimal places, which is guaranteed within one order book.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(pub i64);

impl Price {
    /// Zero price (used as a sentinel, never a valid traded level per §3: `price>0`).
    pub const ZERO: Self = Self(0);

    /// Quantize a floating-point price to `dp` decimal places.
    #[must_use]
    pub fn from_f64(value: f64, dp: DecimalPlaces) -> Self {
        let scale = 10f64.powi(i32::from(dp));
        Self((value * scale).round() as i64)
    }

    /// Recover the floating-point representation at `dp` decimal places.
    #[must_use]
    pub fn to_f64(self, dp: DecimalPlaces) -> f64 {
        let scale = 10f64.powi(i32::from(dp));
        self.0 as f64 / scale
    }

    /// Raw tick value.
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// True if this price is positive, the only valid state for a resting level.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

/// Fixed-point size/quantity, stored as an integer number of units at some
/// externally tracked `DecimalPlaces`. Used both for book-level sizes and for
/// the scaled-integer volume counters in §4.2.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Size(pub i64);

impl Size {
    /// Zero size — per §3, a size that quantizes to zero means "delete".
    pub const ZERO: Self = Self(0);

    /// Quantize a floating-point size to `dp` decimal places.
    #[must_use]
    pub fn from_f64(value: f64, dp: DecimalPlaces) -> Self {
        let scale = 10f64.powi(i32::from(dp));
        Self((value * scale).round() as i64)
    }

    /// Recover the floating-point representation at `dp` decimal places.
    #[must_use]
    pub fn to_f64(self, dp: DecimalPlaces) -> f64 {
        let scale = 10f64.powi(i32::from(dp));
        self.0 as f64 / scale
    }

    /// Raw scaled unit value, used directly as the addend for the atomic
    /// volume counters (already an integer, no further rounding needed).
    #[must_use]
    pub const fn scaled_units(self) -> i64 {
        self.0
    }

    /// True if this size rounds to zero at its tracked decimal places —
    /// the book engine treats this as a delete.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Nanosecond timestamp, monotonic only within a single feed of events (no
/// cross-venue ordering guarantee per §5).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ts(pub u64);

impl Ts {
    /// Timestamp from nanoseconds since the epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Milliseconds since the epoch (truncating).
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Elapsed nanoseconds since an earlier timestamp; zero if `self` precedes `earlier`.
    #[must_use]
    pub const fn since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_quantizes_and_recovers() {
        let p = Price::from_f64(1.00010, 5);
        assert_eq!(p.ticks(), 100_010);
        assert!((p.to_f64(5) - 1.00010).abs() < 1e-9);
    }

    #[test]
    fn size_rounds_to_zero_is_detected() {
        let s = Size::from_f64(0.0000001, 4);
        assert!(s.is_zero());
    }

    #[test]
    fn symbol_serde_roundtrip() {
        let sym = Symbol::new(42);
        let encoded = bincode::serialize(&sym).unwrap();
        let decoded: Symbol = bincode::deserialize(&encoded).unwrap();
        assert_eq!(sym, decoded);
    }

    #[test]
    fn ts_since_saturates() {
        let earlier = Ts::from_nanos(100);
        let later = Ts::from_nanos(50);
        assert_eq!(later.since(earlier), 0);
    }
}
