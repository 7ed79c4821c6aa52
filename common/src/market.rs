//! Canonical market-data shapes: price levels, deltas, trades and the
//! connector-facing message envelope (§3, §6).

use crate::types::{Price, ProviderId, Side, Size, Symbol, Ts};
use serde::{Deserialize, Serialize};

/// One resting price level in an order book (§3 `BookLevel`).
///
/// `price_dp`/`size_dp` are fixed for the lifetime of the level (and in
/// practice for the whole book it belongs to).
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Quoted price.
    pub price: Price,
    /// Resting size at this level.
    pub size: Size,
    /// Cumulative size from the top of book through this level, inclusive.
    pub cumulative_size: Size,
    /// Venue-assigned order/level id, when the venue exposes one (L3).
    pub entry_id: Option<u64>,
    /// True if this level is on the bid side.
    pub is_bid: bool,
    /// Venue-stamped event time.
    pub server_ts: Ts,
    /// Local receipt time.
    pub local_ts: Ts,
    /// Originating provider.
    pub provider: ProviderId,
    /// Symbol this level belongs to.
    pub symbol: Symbol,
    /// Decimal places the price is quoted at.
    pub price_dp: u8,
    /// Decimal places the size is quoted at.
    pub size_dp: u8,
}

impl BookLevel {
    /// True if this level satisfies the §3 invariants (positive price,
    /// non-negative size).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price.is_valid() && self.size.0 >= 0
    }
}

/// What kind of change a [`DeltaLevel`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaAction {
    /// A brand new level.
    New,
    /// A change to an existing level's size.
    Change,
    /// Removal of a level.
    Delete,
    /// No-op placeholder (used by pooled slots between rentals).
    None,
}

impl Default for DeltaAction {
    fn default() -> Self {
        Self::None
    }
}

/// An incremental change to one price level (§3 `DeltaLevel`). Pooled: the
/// engine hands out instances from [`crate::pool`]-style free lists and the
/// consumer must copy any fields it needs synchronously, before the instance
/// is returned to the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaLevel {
    /// Side this delta applies to. `None` only while the slot is pooled/idle.
    pub side: Option<Side>,
    /// Price of the affected level.
    pub price: Price,
    /// New size; zero means "delete this level".
    pub size: Size,
    /// Venue-assigned id, when present, used to disambiguate same-price entries.
    pub entry_id: Option<u64>,
    /// What kind of change this is.
    pub action: DeltaAction,
    /// Venue-stamped event time.
    pub server_ts: Ts,
    /// Local receipt time.
    pub local_ts: Ts,
    /// Venue sequence number this delta is stamped with.
    pub sequence: u64,
}

impl DeltaLevel {
    /// Reset this slot back to an idle, pool-ready state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// An immutable executed trade (§3 `Trade`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Symbol the trade occurred in.
    pub symbol: Symbol,
    /// Execution price.
    pub price: Price,
    /// Executed size.
    pub size: Size,
    /// True if the aggressor was a buyer.
    pub is_buy: bool,
    /// Venue-stamped event time.
    pub server_ts: Ts,
    /// Originating provider.
    pub provider: ProviderId,
    /// Book mid-price observed at the moment of the trade, if known.
    pub mid_price_at_trade: Option<Price>,
}

/// Connection/feed health as surfaced to the UI (§6 `ProviderStatusChanged`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Initial connection attempt in flight.
    Connecting,
    /// Connected and live.
    Connected,
    /// Cleanly disconnected (e.g. user-initiated stop).
    Disconnected,
    /// Disconnected after exhausting the retry budget (§4.7).
    DisconnectedFailed,
}

/// A wire-level price level as received from a REST/WebSocket snapshot,
/// before it has been validated/quantized into a [`BookLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireLevel {
    /// Raw floating-point price.
    pub price: f64,
    /// Raw floating-point size.
    pub size: f64,
    /// Venue-assigned id, when present.
    pub entry_id: Option<u64>,
}

/// A full order-book replacement at a given venue sequence (§6 `Snapshot`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Symbol this snapshot applies to.
    pub symbol: Symbol,
    /// Bid levels, any order — the engine sorts them.
    pub bids: Vec<WireLevel>,
    /// Ask levels, any order — the engine sorts them.
    pub asks: Vec<WireLevel>,
    /// Venue sequence number this snapshot was taken at.
    pub sequence: u64,
}

/// A batch of incremental level changes spanning a sequence range (§6 `Delta`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Symbol this delta applies to.
    pub symbol: Symbol,
    /// The individual level changes carried by this delta.
    pub side_changes: Vec<DeltaLevel>,
    /// First sequence number covered by this delta, inclusive.
    pub start_seq: u64,
    /// Last sequence number covered by this delta, inclusive.
    pub end_seq: u64,
}

/// A trade as received directly from the venue, before it is enriched with
/// the book mid-price (§6 `Trade`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    /// Symbol the trade occurred in.
    pub symbol: Symbol,
    /// Execution price.
    pub price: f64,
    /// Executed size.
    pub size: f64,
    /// True if the aggressor was a buyer.
    pub is_buy: bool,
    /// Venue-stamped event time.
    pub server_ts: Ts,
}

/// Venue acknowledgement of a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    /// Symbol the ack applies to.
    pub symbol: Symbol,
}

/// A venue-reported error, carried as data rather than as a transport-level
/// exception (§6 `Error{code,message}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeError {
    /// Venue-specific error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Internal canonical shape every venue adapter normalizes its wire protocol
/// into. The book engine and connector FSM only ever see this enum — never
/// venue-specific JSON (§6, §1 "out of scope: exchange-specific JSON schemas").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectorMessage {
    /// Full book replacement.
    Snapshot(Snapshot),
    /// Incremental book change.
    Delta(Delta),
    /// Executed trade.
    Trade(RawTrade),
    /// Liveness probe response/push.
    Heartbeat,
    /// Subscription request acknowledged.
    SubscriptionAck(SubscriptionAck),
    /// Venue-reported error.
    Error(ExchangeError),
}

/// Severity of a [`Notification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    /// Informational, no action needed.
    Info,
    /// Degraded but self-healing.
    Warning,
    /// Requires operator attention.
    Error,
}

/// A user-facing notification event (§6 `Notification`). This type models
/// the event only — delivery to a UI/alerting sink is out of scope (§1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Free-form category tag (e.g. "connector", "pool", "backpressure").
    pub category: String,
    /// Human-readable text.
    pub text: String,
}

impl Notification {
    /// Construct a notification.
    #[must_use]
    pub fn new(level: NotificationLevel, category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            category: category.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_level_resets_to_idle() {
        let mut d = DeltaLevel {
            side: Some(Side::Bid),
            price: Price::from_f64(1.0, 5),
            size: Size::from_f64(1.0, 2),
            entry_id: Some(7),
            action: DeltaAction::Change,
            server_ts: Ts::from_nanos(1),
            local_ts: Ts::from_nanos(2),
            sequence: 9,
        };
        d.reset();
        assert_eq!(d.action, DeltaAction::None);
        assert_eq!(d.side, None);
        assert_eq!(d.sequence, 0);
    }

    #[test]
    fn book_level_validity() {
        let lvl = BookLevel {
            price: Price::from_f64(1.0, 5),
            size: Size::from_f64(1.0, 2),
            cumulative_size: Size::from_f64(1.0, 2),
            entry_id: None,
            is_bid: true,
            server_ts: Ts::from_nanos(1),
            local_ts: Ts::from_nanos(1),
            provider: ProviderId::new(1),
            symbol: Symbol::new(1),
            price_dp: 5,
            size_dp: 2,
        };
        assert!(lvl.is_valid());
    }
}
