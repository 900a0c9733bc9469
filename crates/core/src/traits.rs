use crate::events::StreamEvent;
use crate::models::TradingPair;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Manager State
// ---------------------------------------------------------------------------

/// Lifecycle of a stream manager. `Closed` is terminal until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Connecting,
    Receiving,
    Closed,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Idle => "idle",
            ManagerState::Connecting => "connecting",
            ManagerState::Receiving => "receiving",
            ManagerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Stream Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while streaming market data.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Connection failed for {pair}: {reason}")]
    Connect { pair: TradingPair, reason: String },
    #[error("Malformed message on {pair}: {source}")]
    Decode {
        pair: TradingPair,
        #[source]
        source: serde_json::Error,
    },
    #[error("Transport error on {pair}: {reason}")]
    Transport { pair: TradingPair, reason: String },
    #[error("Reception already started")]
    AlreadyStarted,
    #[error("Subscriptions cannot change while the manager is {0}")]
    RegistryFrozen(ManagerState),
    #[error("Manager must be closed before reset, currently {0}")]
    NotClosed(ManagerState),
    /// A receive loop panicked or was aborted.
    #[error("Stream task failed: {0}")]
    TaskFailed(String),
}

impl StreamError {
    /// The pair the error is attributed to, if any.
    pub fn pair(&self) -> Option<&TradingPair> {
        match self {
            StreamError::Connect { pair, .. }
            | StreamError::Decode { pair, .. }
            | StreamError::Transport { pair, .. } => Some(pair),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport Traits
// ---------------------------------------------------------------------------

/// A live market stream bound to a single trading pair.
#[async_trait]
pub trait Connection: Send + Sync {
    fn pair(&self) -> &TradingPair;

    /// Wait for the next message and decode it.
    ///
    /// Returns `Transport` once the connection has been closed, including
    /// when `close` is called while this call is pending.
    async fn receive_one(&self) -> Result<StreamEvent, StreamError>;

    /// Release the transport. Idempotent, and safe to call from any task.
    async fn close(&self);
}

/// Opens one `Connection` per trading pair.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self, pair: &TradingPair) -> Result<Arc<dyn Connection>, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_pair_attribution() {
        let err = StreamError::Transport {
            pair: TradingPair::from("btc_jpy"),
            reason: "eof".to_string(),
        };
        assert_eq!(err.pair().map(|p| p.as_str()), Some("btc_jpy"));
        assert!(StreamError::AlreadyStarted.pair().is_none());
        assert!(StreamError::TaskFailed("panicked".to_string()).pair().is_none());
    }

    #[test]
    fn test_frozen_message_names_state() {
        let err = StreamError::RegistryFrozen(ManagerState::Receiving);
        assert!(err.to_string().contains("receiving"));
    }
}
