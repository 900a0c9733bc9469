use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zaif_core::{PriceLevel, TradingPair};

/// Response of `/last_price/{pair}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastPrice {
    pub last_price: Decimal,
}

/// Response of `/ticker/{pair}`. Aggregates cover the past 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Volume-weighted average price.
    pub vwap: Decimal,
    pub volume: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Ticker {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

/// Response of `/depth/{pair}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Depth {
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

/// One entry of `/currency_pairs/{pair}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub name: String,
    pub title: String,
    pub currency_pair: TradingPair,
    pub description: String,
    /// Minimum order amount of the traded currency.
    pub item_unit_min: Decimal,
    /// Order amount increment of the traded currency.
    pub item_unit_step: Decimal,
    pub aux_unit_min: Decimal,
    pub aux_unit_step: Decimal,
    pub is_token: bool,
    /// Non-zero for event tokens.
    #[serde(default)]
    pub event_number: i64,
}
