//! Zaif public REST API: market metadata, tickers, trades, and depth.

pub mod client;
pub mod types;

pub use client::{PublicApiConfig, PublicApiError, PublicClient};
pub use types::*;
