//! Real-time market data for Zaif.
//!
//! One WebSocket per subscribed trading pair, fanned out to per-pair
//! subscriber channels by [`StreamManager`].

pub mod config;
pub mod connection;
pub mod manager;

#[cfg(test)]
mod mock;

pub use config::StreamConfig;
pub use connection::{WsConnection, WsConnector};
pub use manager::StreamManager;
pub use tokio_util::sync::CancellationToken;
