use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zaif_core::*;

use crate::config::StreamConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials one WebSocket per trading pair.
pub struct WsConnector {
    config: StreamConfig,
}

impl WsConnector {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn dial(&self, pair: &TradingPair) -> Result<Arc<dyn Connection>, StreamError> {
        let url = self.config.stream_url(pair);
        let connect_err = |reason: String| StreamError::Connect {
            pair: pair.clone(),
            reason,
        };
        info!(pair = %pair, url = %url, "Dialing market stream");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_err(format!("Invalid request: {}", e)))?;
        if let Some(origin) = &self.config.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| connect_err(format!("Invalid origin: {}", e)))?;
            request.headers_mut().insert(ORIGIN, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| connect_err(format!("WebSocket connect failed: {}", e)))?;

        info!(pair = %pair, "Connected to market stream");
        let connection: Arc<dyn Connection> = Arc::new(WsConnection::new(pair.clone(), stream));
        Ok(connection)
    }
}

/// A live market stream for one pair.
///
/// The read and write halves sit behind separate locks so `close` never
/// waits on an in-flight `receive_one`; the `closed` token wakes the reader.
pub struct WsConnection {
    pair: TradingPair,
    reader: Mutex<SplitStream<WsStream>>,
    writer: Mutex<SplitSink<WsStream, Message>>,
    closing: AtomicBool,
    closed: CancellationToken,
}

impl WsConnection {
    pub fn new(pair: TradingPair, stream: WsStream) -> Self {
        let (writer, reader) = stream.split();
        Self {
            pair,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    fn transport_error(&self, reason: impl Into<String>) -> StreamError {
        StreamError::Transport {
            pair: self.pair.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn pair(&self) -> &TradingPair {
        &self.pair
    }

    async fn receive_one(&self) -> Result<StreamEvent, StreamError> {
        let mut reader = self.reader.lock().await;
        loop {
            let frame = tokio::select! {
                _ = self.closed.cancelled() => return Err(self.transport_error("Connection closed")),
                frame = reader.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => return decode_event(&self.pair, &text),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("Closed by peer: {} {}", f.code, f.reason))
                        .unwrap_or_else(|| "Closed by peer".to_string());
                    return Err(self.transport_error(reason));
                }
                // Ping/pong and binary frames carry no market data.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(self.transport_error(format!("Read error: {}", e))),
                None => return Err(self.transport_error("Stream ended")),
            }
        }
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!(pair = %self.pair, error = %e, "Error while closing market stream");
        }
        info!(pair = %self.pair, "Market stream closed");
    }
}

/// Decode one text frame into an event.
pub(crate) fn decode_event(pair: &TradingPair, text: &str) -> Result<StreamEvent, StreamError> {
    serde_json::from_str(text).map_err(|source| StreamError::Decode {
        pair: pair.clone(),
        source,
    })
}
