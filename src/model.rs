//! Core data model.
//!
//! A watcher is a tracked product URL on a supported domain, together with the
//! prices recorded for it so far. Field names on the wire are camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// A tracked product URL and its price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watcher {
    /// Assigned by the store, never reused.
    pub id: WatcherId,

    /// Display label. Empty until the first update arrives.
    #[serde(default)]
    pub name: String,

    pub url: String,

    /// One of the domain registry's entries.
    pub domain: String,

    /// Timestamp of the most recent recorded price. [`never_checked`] when none.
    #[serde(default = "never_checked")]
    pub last_checked: DateTime<Utc>,

    /// Set when the watcher was handed to a queue, cleared when an update lands.
    #[serde(default)]
    pub is_checking: bool,

    /// Append-only, oldest first.
    #[serde(default)]
    pub price_history: Vec<Price>,
}

impl Watcher {
    /// A freshly created watcher: no name, no prices, never checked.
    pub fn new(id: WatcherId, domain: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: String::new(),
            url: url.into(),
            domain: domain.into(),
            last_checked: never_checked(),
            is_checking: false,
            price_history: Vec::new(),
        }
    }

    pub fn has_been_checked(&self) -> bool {
        self.last_checked != never_checked()
    }

    /// Time elapsed between the last recorded price and `now`.
    pub fn since_last_check(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_checked)
    }

    /// Apply a price update: refresh the name, advance `last_checked`,
    /// append the price and clear the in-flight mark.
    pub fn apply(&mut self, update: &Update) {
        self.name = update.name.clone();
        self.last_checked = update.price.timestamp;
        self.price_history.push(update.price.clone());
        self.is_checking = false;
    }

    pub fn latest_price(&self) -> Option<&Price> {
        self.price_history.last()
    }
}

/// The zero timestamp (`0001-01-01T00:00:00Z`) meaning "never checked".
pub fn never_checked() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Newtype for watcher IDs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WatcherId(pub u64);

impl WatcherId {
    /// Storage key: 8-byte big-endian, so byte order equals id order.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }
}

impl std::fmt::Display for WatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WatcherId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// A single observed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// A worker's report for one watcher. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// May be omitted on the wire when the id is carried by the route.
    #[serde(default)]
    pub id: WatcherId,
    #[serde(default)]
    pub name: String,
    pub price: Price,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Field name (as serialized) to exact expected value. Every entry must match.
pub type Filter = BTreeMap<String, String>;
