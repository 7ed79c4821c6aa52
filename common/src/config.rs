//! Configuration shapes (§6 "Configuration (enumerated)"). The core never
//! reads these from env vars or files itself — the embedding application
//! constructs them and passes them in, matching the "injected services, not
//! singletons" design note.

use crate::types::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How aggressively a venue's updates are bucketed before the book engine
/// sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationLevel {
    /// 100 millisecond buckets.
    Ms100,
    /// 500 millisecond buckets.
    Ms500,
    /// 1 second buckets.
    S1,
    /// 5 second buckets.
    S5,
}

impl AggregationLevel {
    /// Bucket width in nanoseconds.
    #[must_use]
    pub const fn bucket_width_ns(self) -> u64 {
        match self {
            Self::Ms100 => 100_000_000,
            Self::Ms500 => 500_000_000,
            Self::S1 => 1_000_000_000,
            Self::S5 => 5_000_000_000,
        }
    }
}

/// Which deployment environment a connector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    /// Live trading venue.
    Production,
    /// Sandbox/testnet venue.
    Testnet,
}

/// Per-connector configuration. Credential fields are opaque strings; the
/// core never inspects or persists them (§1 "credential storage" is out of
/// scope — this struct only carries what the embedding application already
/// resolved from its own secret store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Opaque API key, owned and resolved by the embedding application.
    pub api_key: Option<String>,
    /// Opaque API secret, owned and resolved by the embedding application.
    pub api_secret: Option<String>,
    /// Opaque passphrase, required by some venues.
    pub passphrase: Option<String>,
    /// Internal symbol -> venue display name mapping (`EXCHSYM(DISPLAY)`).
    pub symbols: HashMap<Symbol, String>,
    /// Requested order-book depth, typically 10-25.
    pub depth_levels: u32,
    /// Venue-side update throttle, when the venue supports it.
    pub update_interval_ms: Option<u64>,
    /// Time-bucket width applied to derived series (§4.8/§4.9).
    pub aggregation_level: AggregationLevel,
    /// Target deployment environment.
    pub environment: Environment,
    /// Connect/handshake timeout.
    pub connection_timeout_ms: u64,
    /// Upper bound on reconnect attempts before moving to `STOPPED_FAILED`.
    pub max_reconnect_attempts: u32,
    /// Whether verbose connector-internal tracing is enabled.
    pub enable_debug_logging: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            passphrase: None,
            symbols: HashMap::new(),
            depth_levels: 25,
            update_interval_ms: None,
            aggregation_level: AggregationLevel::Ms500,
            environment: Environment::Testnet,
            connection_timeout_ms: 5_000,
            max_reconnect_attempts: 10,
            enable_debug_logging: false,
        }
    }
}

/// Ring-buffer sizing (§4.4, §6 "ring-buffer capacity (power of two)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingBufferConfig {
    /// Ring capacity; must be a power of two.
    pub capacity: usize,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self { capacity: 65_536 }
    }
}

/// Work-queue backpressure thresholds (§4.6, §6 "work-queue warning/critical
/// depth thresholds").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkQueueConfig {
    /// Depth above which a warning notification is raised.
    pub warning_threshold: usize,
    /// Depth above which the condition is treated as critical.
    pub critical_threshold: usize,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 10_000,
            critical_threshold: 50_000,
        }
    }
}
