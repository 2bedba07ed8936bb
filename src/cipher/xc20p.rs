//! XChaCha20-Poly1305 content encryption.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::config::{CEK_SIZE, TAG_SIZE, XC20P_NONCE_SIZE};
use crate::error::{Error, Result};
use crate::primitives::random_bytes;

/// XChaCha20-Poly1305 cipher producing detached nonce/ciphertext/tag
/// pieces for JWE framing.
pub struct Xc20pCipher {
    aead: XChaCha20Poly1305,
}

impl Xc20pCipher {
    /// Creates a new cipher over a 32-byte content-encryption key.
    pub fn new(key: &[u8; CEK_SIZE]) -> Self {
        let aead = XChaCha20Poly1305::new_from_slice(key).expect("valid key size");
        Self { aead }
    }

    /// Encrypts `plaintext` with `aad` bound as additional data.
    ///
    /// # Returns
    /// `(nonce, ciphertext, tag)` with the tag detached
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let nonce_bytes: [u8; XC20P_NONCE_SIZE] = random_bytes()?;
        let nonce = XNonce::from_slice(&nonce_bytes);

        let mut sealed = self
            .aead
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|e| Error::crypto(format!("XChaCha encryption failed: {e}")))?;

        let tag = sealed.split_off(sealed.len() - TAG_SIZE);
        Ok((nonce_bytes.to_vec(), sealed, tag))
    }

    /// Decrypts detached `(nonce, ciphertext, tag)` pieces.
    ///
    /// # Errors
    /// `Decryption` when the authentication tag does not verify.
    pub fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        if nonce.len() != XC20P_NONCE_SIZE {
            return Err(Error::decryption(format!(
                "expected a {XC20P_NONCE_SIZE}-byte nonce, got {}",
                nonce.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(Error::decryption(format!(
                "expected a {TAG_SIZE}-byte tag, got {}",
                tag.len()
            )));
        }

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        self.aead
            .decrypt(XNonce::from_slice(nonce), Payload { msg: &sealed, aad })
            .map_err(|_| Error::decryption("XChaCha authentication failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = Xc20pCipher::new(&[0u8; CEK_SIZE]);
        let (nonce, ct, tag) = cipher.encrypt(b"Hello, World!", b"aad").unwrap();
        let plain = cipher.decrypt(&nonce, &ct, &tag, b"aad").unwrap();
        assert_eq!(plain, b"Hello, World!");
    }

    #[test]
    fn test_nonce_is_extended() {
        let cipher = Xc20pCipher::new(&[0u8; CEK_SIZE]);
        let (nonce, _, _) = cipher.encrypt(b"data", b"").unwrap();
        assert_eq!(nonce.len(), XC20P_NONCE_SIZE);
    }

    #[test]
    fn test_decrypt_tampered_tag() {
        let cipher = Xc20pCipher::new(&[0u8; CEK_SIZE]);
        let (nonce, ct, mut tag) = cipher.encrypt(b"Hello, World!", b"").unwrap();
        tag[0] ^= 0xFF;
        assert!(cipher.decrypt(&nonce, &ct, &tag, b"").is_err());
    }
}
