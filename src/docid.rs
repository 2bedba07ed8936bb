//! Document identifiers.
//!
//! A document ID is 16 random bytes wrapped in an identity multihash
//! (`0x00 0x10` prefix) and encoded as multibase base58-btc with a leading
//! `z`. Decoding validates this exact layout and rejects anything else.

use crate::config::{DOC_ID_SIZE, MULTIBASE_BASE58, MULTIHASH_IDENTITY};
use crate::error::{Error, Result};
use crate::primitives::encoding::{base58_decode, base58_encode};
use crate::primitives::random_bytes;

/// Generates a fresh random document identifier.
pub fn generate_id() -> Result<String> {
    let raw: [u8; DOC_ID_SIZE] = random_bytes()?;
    Ok(encode_id(&raw))
}

/// Encodes 16 raw bytes as a multibase document identifier.
pub fn encode_id(raw: &[u8; DOC_ID_SIZE]) -> String {
    let mut framed = Vec::with_capacity(2 + DOC_ID_SIZE);
    framed.push(MULTIHASH_IDENTITY);
    framed.push(DOC_ID_SIZE as u8);
    framed.extend_from_slice(raw);
    format!("{MULTIBASE_BASE58}{}", base58_encode(&framed))
}

/// Decodes a multibase document identifier back into its 16 raw bytes.
///
/// # Errors
/// `InvalidArgument` for a missing multibase prefix, a non-base58 body,
/// a wrong length, or a non-identity multihash header.
pub fn decode_id(id: &str) -> Result<[u8; DOC_ID_SIZE]> {
    let body = id
        .strip_prefix(MULTIBASE_BASE58)
        .ok_or_else(|| Error::invalid_argument(format!("document ID must be multibase base58 (leading 'z'): {id}")))?;

    let framed = base58_decode(body)
        .map_err(|_| Error::invalid_argument(format!("document ID is not valid base58: {id}")))?;

    if framed.len() != 2 + DOC_ID_SIZE {
        return Err(Error::invalid_argument(format!(
            "document ID must decode to {} bytes, got {}",
            2 + DOC_ID_SIZE,
            framed.len()
        )));
    }

    if framed[0] != MULTIHASH_IDENTITY || framed[1] != DOC_ID_SIZE as u8 {
        return Err(Error::invalid_argument(
            "document ID has an invalid multihash header".to_string(),
        ));
    }

    let mut raw = [0u8; DOC_ID_SIZE];
    raw.copy_from_slice(&framed[2..]);
    Ok(raw)
}

/// Validates a document identifier without returning its bytes.
pub fn assert_id(id: &str) -> Result<()> {
    decode_id(id).map(|_| ())
}
