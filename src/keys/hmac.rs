//! HMAC signing capability.
//!
//! An HMAC identity blinds attribute names and values for the search
//! index. The engine only ever calls `sign`; `verify` exists for
//! implementations that check their own outputs.

use async_trait::async_trait;
use hmac::{Hmac, Mac as _};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::{HMAC_KEY_TYPE, HMAC_SIZE};
use crate::error::{Error, Result};
use crate::primitives::random_bytes;

/// A named HMAC-SHA-256 signing capability.
#[async_trait]
pub trait HmacSigner: Send + Sync {
    /// Stable identifier of this HMAC identity.
    fn id(&self) -> &str;

    /// Key type identifier, e.g. `Sha256HmacKey2019`.
    fn key_type(&self) -> &str;

    /// Signs `data`, returning the 32-byte MAC.
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Verifies `signature` over `data` in constant time.
    async fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool>;
}

/// In-memory HMAC-SHA-256 implementation.
///
/// Key material is held behind a [`SecretBox`] and never logged or
/// serialized.
pub struct InMemoryHmac {
    id: String,
    key: SecretBox<Vec<u8>>,
}

impl InMemoryHmac {
    /// Creates an HMAC identity over the provided key bytes.
    ///
    /// # Errors
    /// Returns `Crypto` if the key is empty.
    pub fn new(id: impl Into<String>, key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::crypto("hmac key cannot be empty"));
        }
        Ok(Self {
            id: id.into(),
            key: SecretBox::new(Box::new(key.to_vec())),
        })
    }

    /// Creates an HMAC identity with a fresh random 32-byte key.
    pub fn generate(id: impl Into<String>) -> Result<Self> {
        let key: [u8; HMAC_SIZE] = random_bytes()?;
        Self::new(id, &key)
    }

    fn compute(&self, data: &[u8]) -> Result<[u8; HMAC_SIZE]> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::crypto(format!("hmac creation failed: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }
}

#[async_trait]
impl HmacSigner for InMemoryHmac {
    fn id(&self) -> &str {
        &self.id
    }

    fn key_type(&self) -> &str {
        HMAC_KEY_TYPE
    }

    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.compute(data)?.to_vec())
    }

    async fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool> {
        if signature.len() != HMAC_SIZE {
            return Ok(false);
        }
        let expected = self.compute(data)?;
        Ok(expected.ct_eq(signature).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_is_deterministic() {
        let hmac = InMemoryHmac::new("did:key:test#hmac", &[7u8; 32]).unwrap();
        let a = hmac.sign(b"data").await.unwrap();
        let b = hmac.sign(b"data").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HMAC_SIZE);
    }

    #[tokio::test]
    async fn test_different_keys_differ() {
        let a = InMemoryHmac::new("a", &[1u8; 32]).unwrap();
        let b = InMemoryHmac::new("b", &[2u8; 32]).unwrap();
        assert_ne!(
            a.sign(b"data").await.unwrap(),
            b.sign(b"data").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_verify() {
        let hmac = InMemoryHmac::generate("h").unwrap();
        let sig = hmac.sign(b"data").await.unwrap();
        assert!(hmac.verify(b"data", &sig).await.unwrap());
        assert!(!hmac.verify(b"other", &sig).await.unwrap());
        assert!(!hmac.verify(b"data", &sig[1..]).await.unwrap());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(InMemoryHmac::new("h", &[]).is_err());
    }
}
