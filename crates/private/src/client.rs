use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::{sign, NonceGenerator};
use crate::types::*;

/// Errors returned by the trading API client.
#[derive(Debug, thiserror::Error)]
pub enum PrivateApiError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Zaif API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("Signing failed: {0}")]
    Signing(String),
    /// The exchange answered with `success: 0`.
    #[error("Zaif rejected the request: {0}")]
    Api(String),
    #[error("API key and secret are required")]
    MissingCredentials,
}

/// Configuration for the trading API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateApiConfig {
    pub base_url: String,
    pub key: String,
    pub secret: String,
    pub timeout_secs: u64,
}

impl Default for PrivateApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.zaif.jp/tapi".to_string(),
            key: String::new(),
            secret: String::new(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for PrivateApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateApiConfig")
            .field("base_url", &self.base_url)
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Every response is wrapped as `{"success": 1, "return": ...}` or
/// `{"success": 0, "error": "..."}`.
#[derive(Deserialize)]
struct Envelope {
    success: i64,
    #[serde(rename = "return", default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

const NO_PARAMS: [(&str, &str); 0] = [];

/// Client for the signed Zaif trading endpoints.
pub struct PrivateClient {
    client: Client,
    base_url: String,
    key: String,
    secret: String,
    nonces: NonceGenerator,
}

impl PrivateClient {
    pub fn new(config: PrivateApiConfig) -> Result<Self, PrivateApiError> {
        if config.key.is_empty() || config.secret.is_empty() {
            return Err(PrivateApiError::MissingCredentials);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
            key: config.key,
            secret: config.secret,
            nonces: NonceGenerator::new(),
        })
    }

    /// Balances, key permissions, and account counters.
    #[instrument(skip(self))]
    pub async fn get_info(&self) -> Result<Info, PrivateApiError> {
        self.call("get_info", &NO_PARAMS).await
    }

    /// Open orders keyed by order id.
    #[instrument(skip(self))]
    pub async fn active_orders(
        &self,
        params: &ActiveOrdersParams,
    ) -> Result<HashMap<String, ActiveOrder>, PrivateApiError> {
        self.call("active_orders", params).await
    }

    #[instrument(skip(self))]
    pub async fn trade(&self, params: &TradeParams) -> Result<TradeResult, PrivateApiError> {
        self.call("trade", params).await
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: u64) -> Result<CancelResult, PrivateApiError> {
        self.call("cancel_order", &[("order_id", order_id)]).await
    }

    #[instrument(skip(self, params), fields(currency = %params.currency, amount = %params.amount))]
    pub async fn withdraw(&self, params: &WithdrawParams) -> Result<WithdrawResult, PrivateApiError> {
        self.call("withdraw", params).await
    }

    /// Deposits keyed by record id.
    #[instrument(skip(self))]
    pub async fn deposit_history(
        &self,
        params: &HistoryParams,
    ) -> Result<HashMap<String, DepositRecord>, PrivateApiError> {
        self.call("deposit_history", params).await
    }

    /// Withdrawals keyed by record id.
    #[instrument(skip(self))]
    pub async fn withdraw_history(
        &self,
        params: &HistoryParams,
    ) -> Result<HashMap<String, WithdrawRecord>, PrivateApiError> {
        self.call("withdraw_history", params).await
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, PrivateApiError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = request_body(method, &self.nonces.next(), params)?;
        let signature = sign(&self.secret, &body)?;
        debug!(method, "Calling Zaif trading API");

        let response = self
            .client
            .post(&self.base_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("Key", &self.key)
            .header("Sign", signature)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        decode_response(status, &body).inspect_err(|e| {
            if matches!(e, PrivateApiError::Api(_)) {
                warn!(method, error = %e, "Trading API call rejected");
            }
        })
    }
}

/// `method=<name>&nonce=<nonce>` followed by the encoded parameters.
fn request_body<P: Serialize + ?Sized>(
    method: &str,
    nonce: &str,
    params: &P,
) -> Result<String, PrivateApiError> {
    let mut body = serde_urlencoded::to_string([("method", method), ("nonce", nonce)])?;
    let params = serde_urlencoded::to_string(params)?;
    if !params.is_empty() {
        body.push('&');
        body.push_str(&params);
    }
    Ok(body)
}

/// Unwrap the response envelope; `success: 0` becomes `Api`.
fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
) -> Result<T, PrivateApiError> {
    if !status.is_success() {
        return Err(PrivateApiError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.success == 0 {
        return Err(PrivateApiError::Api(
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(serde_json::from_value(envelope.result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use zaif_core::{TradeSide, TradingPair};

    fn config() -> PrivateApiConfig {
        PrivateApiConfig {
            key: "key".to_string(),
            secret: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_credentials_required() {
        let result = PrivateClient::new(PrivateApiConfig::default());
        assert!(matches!(result, Err(PrivateApiError::MissingCredentials)));
        assert!(PrivateClient::new(config()).is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let printed = format!("{:?}", config());
        assert!(printed.contains("key"));
        assert!(!printed.contains("\"secret\""));
    }

    #[test]
    fn test_request_body_layout() {
        let body = request_body("get_info", "123.000001", &NO_PARAMS).unwrap();
        assert_eq!(body, "method=get_info&nonce=123.000001");

        let params = TradeParams {
            currency_pair: TradingPair::from("mona_jpy"),
            action: TradeSide::Ask,
            price: dec!(402.5),
            amount: dec!(10),
            limit: Some(dec!(420)),
        };
        let body = request_body("trade", "5.000000", &params).unwrap();
        assert_eq!(
            body,
            "method=trade&nonce=5.000000&currency_pair=mona_jpy&action=ask&price=402.5&amount=10&limit=420"
        );

        let body = request_body("cancel_order", "5.000001", &[("order_id", 184u64)]).unwrap();
        assert_eq!(body, "method=cancel_order&nonce=5.000001&order_id=184");
    }

    #[test]
    fn test_decode_success_envelope() {
        let result: TradeResult = decode_response(
            StatusCode::OK,
            r#"{"success": 1, "return": {"received": 0.01, "remains": 0, "order_id": 0,
                "funds": {"jpy": 325, "btc": 1.392}}}"#,
        )
        .unwrap();
        assert_eq!(result.received, dec!(0.01));
        assert_eq!(result.order_id, 0);
        assert_eq!(result.funds["btc"], dec!(1.392));
    }

    #[test]
    fn test_decode_rejected_request() {
        let result: Result<Info, _> = decode_response(
            StatusCode::OK,
            r#"{"success": 0, "error": "nonce not incremented"}"#,
        );
        match result {
            Err(PrivateApiError::Api(message)) => assert_eq!(message, "nonce not incremented"),
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_failures() {
        let status: Result<Info, _> = decode_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            status,
            Err(PrivateApiError::Status { status: 502, .. })
        ));

        let html: Result<Info, _> = decode_response(StatusCode::OK, "<html></html>");
        assert!(matches!(html, Err(PrivateApiError::Parse(_))));

        // A successful envelope whose payload has the wrong shape.
        let shape: Result<CancelResult, _> =
            decode_response(StatusCode::OK, r#"{"success": 1, "return": {"txid": "x"}}"#);
        assert!(matches!(shape, Err(PrivateApiError::Parse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = PrivateClient::new(PrivateApiConfig {
            base_url: "http://127.0.0.1:9/tapi".to_string(),
            timeout_secs: 2,
            ..config()
        })
        .unwrap();
        let result = client.get_info().await;
        assert!(matches!(result, Err(PrivateApiError::Network(_))));
    }
}
