//! Zaif trading API: balances, orders, and withdrawals, signed per request.

pub mod auth;
pub mod client;
pub mod types;

pub use client::{PrivateApiConfig, PrivateApiError, PrivateClient};
pub use types::*;
