use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::client::PrivateApiError;

type HmacSha512 = Hmac<Sha512>;

/// Nonces count from 2015-01-01T00:00:00Z.
const NONCE_EPOCH_SECS: i64 = 1_420_070_400;

/// Hex-encoded HMAC-SHA512 of the form body, sent as the `Sign` header.
pub fn sign(secret: &str, body: &str) -> Result<String, PrivateApiError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| PrivateApiError::Signing(format!("Failed to create HMAC: {}", e)))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Issues strictly increasing nonces with microsecond resolution.
///
/// The exchange rejects a nonce that does not exceed the previous one, so two
/// calls inside the same microsecond still get distinct values.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last_micros: AtomicI64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        let now = Utc::now().timestamp_micros() - NONCE_EPOCH_SECS * 1_000_000;
        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        format_nonce(now.max(previous + 1))
    }
}

/// Seconds with six decimals, e.g. `1.000005`.
fn format_nonce(micros: i64) -> String {
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}
