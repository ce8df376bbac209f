use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::core::errors::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

/// Guards administrative routes (ingestion) behind the configured API key.
///
/// When no key is configured the route is refused outright rather than
/// left open.
pub fn require_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected.map(str::trim).filter(|v| !v.is_empty()) else {
        return Err(ApiError::ConfigurationMissing("server.api_key".to_string()));
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if digest(provided) == digest(expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

// Comparing digests keeps the comparison length-independent.
fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}
