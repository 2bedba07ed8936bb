//! Base64url and base58 text encodings.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::{Error, Result};

/// Encodes bytes as unpadded base64url.
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes an unpadded base64url string.
pub fn base64url_decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::invalid_argument(format!("invalid base64url: {e}")))
}

/// Encodes bytes as base58-btc.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decodes a base58-btc string.
pub fn base58_decode(encoded: &str) -> Result<Vec<u8>> {
    bs58::decode(encoded)
        .into_vec()
        .map_err(|e| Error::invalid_argument(format!("invalid base58: {e}")))
}
