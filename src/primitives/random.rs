//! Cryptographically secure random byte generation.

use rand::RngExt;

use crate::error::Result;

/// Generates cryptographically secure random bytes.
///
/// # Returns
/// An array of N random bytes
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    Ok(bytes)
}
