use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use zaif_core::{Trade, TradingPair};

use crate::types::*;

/// Errors returned by the public REST API client.
#[derive(Debug, thiserror::Error)]
pub enum PublicApiError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Zaif API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for the public REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for PublicApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.zaif.jp/api/1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Client for the unauthenticated Zaif endpoints.
#[derive(Clone)]
pub struct PublicClient {
    client: Client,
    base_url: String,
}

impl PublicClient {
    pub fn new(config: PublicApiConfig) -> Result<Self, PublicApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Metadata for one pair, or every pair when `pair` is `"all"`.
    #[instrument(skip(self))]
    pub async fn currency_pairs(&self, pair: &str) -> Result<Vec<CurrencyPair>, PublicApiError> {
        self.get(&format!("currency_pairs/{}", pair)).await
    }

    #[instrument(skip(self))]
    pub async fn last_price(&self, pair: &TradingPair) -> Result<LastPrice, PublicApiError> {
        self.get(&format!("last_price/{}", pair)).await
    }

    #[instrument(skip(self))]
    pub async fn ticker(&self, pair: &TradingPair) -> Result<Ticker, PublicApiError> {
        self.get(&format!("ticker/{}", pair)).await
    }

    /// Recent trades, newest first.
    #[instrument(skip(self))]
    pub async fn trades(&self, pair: &TradingPair) -> Result<Vec<Trade>, PublicApiError> {
        self.get(&format!("trades/{}", pair)).await
    }

    #[instrument(skip(self))]
    pub async fn depth(&self, pair: &TradingPair) -> Result<Depth, PublicApiError> {
        self.get(&format!("depth/{}", pair)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PublicApiError> {
        let url = self.url(path);
        debug!("Fetching Zaif public API: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode_response(status, &body)
    }
}

/// Map a non-success status to `Status`, otherwise parse the body.
fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<T, PublicApiError> {
    if !status.is_success() {
        return Err(PublicApiError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    Ok(serde_json::from_str(body)?)
}
