use serde::{Deserialize, Serialize};
use zaif_core::TradingPair;

/// Configuration for the market stream connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket endpoint; the pair is appended as `?currency_pair=<pair>`.
    pub endpoint: String,
    /// `Origin` header sent with the upgrade request.
    pub origin: Option<String>,
    /// Suggested buffer size for subscriber channels. The manager never
    /// creates channels itself; the CLI sizes its shared channel with this.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://ws.zaif.jp:8888/stream".to_string(),
            origin: Some("http://localhost".to_string()),
            channel_capacity: 1024,
        }
    }
}

impl StreamConfig {
    pub fn stream_url(&self, pair: &TradingPair) -> String {
        format!("{}?currency_pair={}", self.endpoint, pair)
    }
}
