use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Trading Pair
// ---------------------------------------------------------------------------

/// Market identifier as the exchange spells it (e.g. "btc_jpy").
///
/// Opaque: the client never parses it into base/quote currencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradingPair(String);

impl TradingPair {
    pub fn new(pair: impl Into<String>) -> Self {
        Self(pair.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TradingPair {
    fn from(pair: &str) -> Self {
        Self(pair.to_string())
    }
}

impl From<String> for TradingPair {
    fn from(pair: String) -> Self {
        Self(pair)
    }
}

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// Which side of the book initiated a trade or moved the last price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Bid,
    Ask,
}

/// One `[price, amount]` level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Decimal, Decimal)", into = "(Decimal, Decimal)")]
pub struct PriceLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl From<(Decimal, Decimal)> for PriceLevel {
    fn from((price, amount): (Decimal, Decimal)) -> Self {
        Self { price, amount }
    }
}

impl From<PriceLevel> for (Decimal, Decimal) {
    fn from(level: PriceLevel) -> Self {
        (level.price, level.amount)
    }
}

/// A single executed trade, as reported by both the REST and stream APIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trade {
    pub currency_pair: TradingPair,
    /// Misspelled duplicate of `currency_pair` that the stream API still sends.
    #[serde(rename = "currenty_pair", skip_serializing_if = "Option::is_none")]
    pub legacy_pair: Option<TradingPair>,
    pub trade_type: Option<TradeSide>,
    pub price: Decimal,
    pub amount: Decimal,
    /// Exchange-assigned trade id, monotonically increasing per pair.
    pub tid: i64,
    /// Unix timestamp in seconds.
    pub date: i64,
}

impl Trade {
    /// The pair this trade belongs to, falling back to the legacy field.
    pub fn pair(&self) -> &TradingPair {
        match &self.legacy_pair {
            Some(legacy) if self.currency_pair.is_empty() => legacy,
            _ => &self.currency_pair,
        }
    }

    pub fn traded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

/// Latest traded price and the side that moved it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastPriceUpdate {
    pub action: Option<TradeSide>,
    pub price: Decimal,
}
