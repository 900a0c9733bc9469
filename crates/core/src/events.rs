use crate::models::*;
use serde::{Deserialize, Serialize};

/// One decoded message from a pair's market stream.
///
/// The stream sends every field on every message, but absent fields decode
/// to their empty value: the wire format does not distinguish the two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEvent {
    /// Ask levels, best (lowest) price first.
    pub asks: Vec<PriceLevel>,
    /// Bid levels, best (highest) price first.
    pub bids: Vec<PriceLevel>,
    pub target_users: Vec<String>,
    /// Most recent trades, newest first.
    pub trades: Vec<Trade>,
    pub last_price: LastPriceUpdate,
    pub currency_pair: TradingPair,
    /// Server time, e.g. "2018-05-13 15:41:25.741231".
    pub timestamp: String,
}

impl StreamEvent {
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }
}
