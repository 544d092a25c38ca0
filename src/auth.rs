use crate::error::RequestError;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Checks the per-request API key against the configured one.
pub struct ApiKeyGate {
    expected: Vec<u8>,
}

impl ApiKeyGate {
    pub fn new(api_key: &str) -> Self {
        Self {
            expected: Sha256::digest(api_key.as_bytes()).to_vec(),
        }
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), RequestError> {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(RequestError::Unauthorized)?;

        if self.matches(provided) {
            Ok(())
        } else {
            tracing::warn!("rejected request with invalid API key");
            Err(RequestError::Unauthorized)
        }
    }

    fn matches(&self, provided: &str) -> bool {
        // Hashing first makes both sides the same length.
        let provided = Sha256::digest(provided.as_bytes());
        constant_time_eq(provided.as_slice(), &self.expected)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
