//! AES-256-GCM content encryption.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::config::{A256GCM_NONCE_SIZE, CEK_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::primitives::random_bytes;

/// AES-256-GCM cipher producing detached nonce/ciphertext/tag pieces for
/// JWE framing.
pub struct AesGcmCipher {
    aead: Aes256Gcm,
}

impl AesGcmCipher {
    /// Creates a new cipher over a 32-byte content-encryption key.
    pub fn new(key: &[u8; CEK_SIZE]) -> Self {
        let aead = Aes256Gcm::new_from_slice(key).expect("valid key size");
        Self { aead }
    }

    /// Encrypts `plaintext` with `aad` bound as additional data.
    ///
    /// # Returns
    /// `(nonce, ciphertext, tag)` with the tag detached
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let nonce_bytes: [u8; A256GCM_NONCE_SIZE] = random_bytes()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut sealed = self
            .aead
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|e| Error::crypto(format!("AES-GCM encryption failed: {e}")))?;

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
        if nonce.len() != A256GCM_NONCE_SIZE {
            return Err(Error::decryption(format!(
                "expected a {A256GCM_NONCE_SIZE}-byte nonce, got {}",
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
            .decrypt(Nonce::from_slice(nonce), Payload { msg: &sealed, aad })
            .map_err(|_| Error::decryption("AES-GCM authentication failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = AesGcmCipher::new(&[0u8; CEK_SIZE]);
        let (nonce, ct, tag) = cipher.encrypt(b"Hello, World!", b"aad").unwrap();
        let plain = cipher.decrypt(&nonce, &ct, &tag, b"aad").unwrap();
        assert_eq!(plain, b"Hello, World!");
    }

    #[test]
    fn test_decrypt_tampered_ciphertext() {
        let cipher = AesGcmCipher::new(&[0u8; CEK_SIZE]);
        let (nonce, mut ct, tag) = cipher.encrypt(b"Hello, World!", b"").unwrap();
        if let Some(last) = ct.last_mut() {
            *last ^= 0xFF;
        }
        assert!(cipher.decrypt(&nonce, &ct, &tag, b"").is_err());
    }

    #[test]
    fn test_decrypt_wrong_aad() {
        let cipher = AesGcmCipher::new(&[0u8; CEK_SIZE]);
        let (nonce, ct, tag) = cipher.encrypt(b"data", b"aad").unwrap();
        assert!(cipher.decrypt(&nonce, &ct, &tag, b"other").is_err());
    }

    #[test]
    fn test_decrypt_bad_nonce_length() {
        let cipher = AesGcmCipher::new(&[0u8; CEK_SIZE]);
        let (_, ct, tag) = cipher.encrypt(b"data", b"").unwrap();
        assert!(cipher.decrypt(&[0u8; 4], &ct, &tag, b"").is_err());
    }
}
