//! Concat KDF (NIST SP 800-56A §5.8.1) for ECDH-ES key wrapping.
//!
//! Derives the 256-bit key-encryption key from an ECDH shared secret.
//! The output is exactly one SHA-256 block, so a single round with
//! counter 1 suffices.

use sha2::{Digest, Sha256};

use crate::config::CEK_SIZE;

/// Derives a key-encryption key from `shared_secret`.
///
/// `alg` is the key-wrap algorithm identifier; `apu` and `apv` are the
/// decoded PartyUInfo/PartyVInfo bytes from the recipient header.
pub fn concat_kdf(shared_secret: &[u8], alg: &str, apu: &[u8], apv: &[u8]) -> [u8; CEK_SIZE] {
    let keydatalen_bits = (CEK_SIZE as u32) * 8;

    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(shared_secret);
    // AlgorithmID, PartyUInfo, PartyVInfo: each length-prefixed.
    hasher.update((alg.len() as u32).to_be_bytes());
    hasher.update(alg.as_bytes());
    hasher.update((apu.len() as u32).to_be_bytes());
    hasher.update(apu);
    hasher.update((apv.len() as u32).to_be_bytes());
    hasher.update(apv);
    // SuppPubInfo: the key length in bits.
    hasher.update(keydatalen_bits.to_be_bytes());
    hasher.finalize().into()
}
