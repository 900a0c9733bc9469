use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use zaif_core::{TradeSide, TradingPair};

/// Balance per currency code, e.g. `"jpy"` or `"btc"`.
pub type Funds = HashMap<String, Decimal>;

// ---------------------------------------------------------------------------
// Request Parameters
// ---------------------------------------------------------------------------

/// Sort direction for paged history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Paging filters shared by the order and history queries. Unset fields are
/// left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Paging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActiveOrdersParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_pair: Option<TradingPair>,
    #[serde(flatten)]
    pub paging: Paging,
}

/// A limit order. `limit` sets the take-profit price the exchange places
/// once the order fills.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeParams {
    pub currency_pair: TradingPair,
    pub action: TradeSide,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawParams {
    pub currency: String,
    pub address: String,
    pub amount: Decimal,
    /// Extra miner fee, where the currency supports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt_fee: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryParams {
    pub currency: String,
    #[serde(flatten)]
    pub paging: Paging,
}

impl HistoryParams {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            paging: Paging::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Permissions granted to the API key (1 = allowed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rights {
    pub info: u8,
    pub trade: u8,
    pub withdraw: u8,
    pub personal_info: u8,
    pub id_info: u8,
}

/// Response of `get_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// Balances available for trading.
    #[serde(default)]
    pub funds: Funds,
    /// Balances including amounts locked in open orders.
    #[serde(default)]
    pub deposit: Funds,
    #[serde(default)]
    pub rights: Rights,
    #[serde(default)]
    pub open_orders: u64,
    #[serde(default)]
    pub trade_count: u64,
    pub server_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOrder {
    pub currency_pair: TradingPair,
    pub action: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    #[serde(deserialize_with = "unix_seconds")]
    pub timestamp: i64,
}

impl ActiveOrder {
    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    /// Amount filled immediately.
    pub received: Decimal,
    /// Amount left on the book.
    pub remains: Decimal,
    /// Zero when the order filled completely.
    pub order_id: u64,
    #[serde(default)]
    pub funds: Funds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelResult {
    pub order_id: u64,
    #[serde(default)]
    pub funds: Funds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawResult {
    pub txid: String,
    #[serde(default)]
    pub funds: Funds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    #[serde(deserialize_with = "unix_seconds")]
    pub timestamp: i64,
    pub address: String,
    pub amount: Decimal,
    #[serde(default)]
    pub txid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawRecord {
    #[serde(deserialize_with = "unix_seconds")]
    pub timestamp: i64,
    pub address: String,
    pub amount: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default)]
    pub txid: String,
}

/// The API sends timestamps as numbers on some endpoints and as strings on
/// others.
fn unix_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(secs) => Ok(secs),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_info() {
        let info: Info = serde_json::from_str(
            r#"{"funds": {"jpy": 15320, "btc": 1.389, "mona": 2600},
                "deposit": {"jpy": 20440, "btc": 1.479, "mona": 3200},
                "rights": {"info": 1, "trade": 1, "withdraw": 0},
                "trade_count": 18, "open_orders": 3, "server_time": 1401950833}"#,
        )
        .unwrap();
        assert_eq!(info.funds["btc"], dec!(1.389));
        assert_eq!(info.deposit["jpy"], dec!(20440));
        assert_eq!(info.rights.trade, 1);
        assert_eq!(info.rights.withdraw, 0);
        assert_eq!(info.open_orders, 3);
    }

    #[test]
    fn test_active_order_accepts_string_timestamp() {
        let orders: HashMap<String, ActiveOrder> = serde_json::from_str(
            r#"{"184": {"currency_pair": "btc_jpy", "action": "ask", "amount": 0.01,
                        "price": 56000, "timestamp": "1402021125"}}"#,
        )
        .unwrap();
        let order = &orders["184"];
        assert_eq!(order.action, TradeSide::Ask);
        assert_eq!(order.timestamp, 1402021125);
        assert_eq!(order.placed_at().unwrap().timestamp(), 1402021125);
    }

    #[test]
    fn test_withdraw_record_accepts_numeric_timestamp() {
        let record: WithdrawRecord = serde_json::from_str(
            r#"{"timestamp": 1435745065, "address": "12qwQ3sPJJAosodSUhSpMds4WfUPBeFEM2",
                "amount": 0.001, "txid": "64dcf59523379ba282ae8cd61d2e9382c7849afe3a3802c0abb08a60067a159f"}"#,
        )
        .unwrap();
        assert_eq!(record.timestamp, 1435745065);
        assert_eq!(record.fee, Decimal::ZERO);

        let bad = serde_json::from_str::<WithdrawRecord>(
            r#"{"timestamp": "yesterday", "address": "x", "amount": 1}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_trade_params_form_encoding() {
        let params = TradeParams {
            currency_pair: TradingPair::from("btc_jpy"),
            action: TradeSide::Bid,
            price: dec!(1000000),
            amount: dec!(0.01),
            limit: None,
        };
        assert_eq!(
            serde_urlencoded::to_string(&params).unwrap(),
            "currency_pair=btc_jpy&action=bid&price=1000000&amount=0.01"
        );
    }

    #[test]
    fn test_history_params_skip_unset_paging() {
        let mut params = HistoryParams::new("btc");
        assert_eq!(serde_urlencoded::to_string(&params).unwrap(), "currency=btc");

        params.paging.count = Some(10);
        params.paging.order = Some(SortOrder::Asc);
        assert_eq!(
            serde_urlencoded::to_string(&params).unwrap(),
            "currency=btc&count=10&order=ASC"
        );
    }
}
