//! SHA-256 hashing helpers.

use sha2::{Digest, Sha256};

use crate::config::HMAC_SIZE;

/// Computes SHA-256 of a single input.
pub fn sha256(data: &[u8]) -> [u8; HMAC_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes SHA-256 over the concatenation of multiple parts.
///
/// The parts are fed to the hasher in order without an intermediate
/// allocation; empty parts are skipped.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; HMAC_SIZE] {
    let mut hasher = Sha256::new();
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .for_each(|part| hasher.update(part));
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            digest[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "digest prefix mismatch"
        );
    }

    #[test]
    fn test_concat_matches_single() {
        let joined = sha256(b"helloworld");
        let parts = sha256_concat(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_concat_skips_empty_parts() {
        let with_empty = sha256_concat(&[b"", b"data", b""]);
        assert_eq!(with_empty, sha256(b"data"));
    }
}
