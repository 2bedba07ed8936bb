//! Key-agreement capability and in-memory key pairs.
//!
//! A key-agreement key derives the shared secret that wraps per-recipient
//! content-encryption keys. The recommended suite pairs with X25519, the
//! FIPS suite with P-256.

use async_trait::async_trait;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519SecretKey};
use zeroize::Zeroizing;

use crate::config::{P256_KEY_TYPE, X25519_KEY_TYPE};
use crate::error::{Error, Result};
use crate::primitives::encoding::{base64url_decode, base64url_encode};
use crate::primitives::random_bytes;

/// A public key in JWK form, as carried in `epk` headers and returned by
/// key resolvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    /// base64url public key bytes (X25519) or x-coordinate (P-256).
    pub x: String,
    /// base64url y-coordinate, P-256 only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A named key-agreement capability.
#[async_trait]
pub trait KeyAgreementKey: Send + Sync {
    /// Stable identifier, used as the `kid` of recipients wrapped for this
    /// key.
    fn id(&self) -> &str;

    /// Key type identifier.
    fn key_type(&self) -> &str;

    /// The public half in JWK form.
    fn public_jwk(&self) -> PublicJwk;

    /// Derives the ECDH shared secret against `public`.
    async fn derive_secret(&self, public: &PublicJwk) -> Result<Vec<u8>>;
}

/// In-memory X25519 key pair.
pub struct X25519KeyPair {
    id: String,
    secret: X25519SecretKey,
    public: X25519PublicKey,
}

impl X25519KeyPair {
    /// Generates a fresh key pair.
    pub fn generate(id: impl Into<String>) -> Result<Self> {
        let seed: [u8; 32] = random_bytes()?;
        Ok(Self::from_seed(id, seed))
    }

    /// Builds a key pair from 32 secret bytes (clamped internally).
    pub fn from_seed(id: impl Into<String>, seed: [u8; 32]) -> Self {
        let secret = X25519SecretKey::from(seed);
        let public = X25519PublicKey::from(&secret);
        Self { id: id.into(), secret, public }
    }

    pub(crate) fn diffie_hellman(&self, peer: &PublicJwk) -> Result<Zeroizing<Vec<u8>>> {
        if peer.crv != "X25519" {
            return Err(Error::crypto(format!(
                "expected an X25519 public key, got crv {}",
                peer.crv
            )));
        }
        let raw = base64url_decode(&peer.x)
            .map_err(|_| Error::crypto("invalid X25519 public key encoding"))?;
        let raw: [u8; 32] = raw
            .try_into()
            .map_err(|_| Error::crypto("X25519 public key must be 32 bytes"))?;
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(raw));
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}

#[async_trait]
impl KeyAgreementKey for X25519KeyPair {
    fn id(&self) -> &str {
        &self.id
    }

    fn key_type(&self) -> &str {
        X25519_KEY_TYPE
    }

    fn public_jwk(&self) -> PublicJwk {
        PublicJwk {
            kty: "OKP".into(),
            crv: "X25519".into(),
            x: base64url_encode(self.public.as_bytes()),
            y: None,
            kid: (!self.id.is_empty()).then(|| self.id.clone()),
        }
    }

    async fn derive_secret(&self, public: &PublicJwk) -> Result<Vec<u8>> {
        Ok(self.diffie_hellman(public)?.to_vec())
    }
}

/// In-memory P-256 key pair.
pub struct P256KeyPair {
    id: String,
    secret: p256::SecretKey,
}

impl P256KeyPair {
    /// Generates a fresh key pair.
    pub fn generate(id: impl Into<String>) -> Result<Self> {
        // Rejection-sample scalars; out-of-range draws are astronomically
        // rare but possible.
        for _ in 0..16 {
            let seed: [u8; 32] = random_bytes()?;
            if let Ok(secret) = p256::SecretKey::from_slice(&seed) {
                return Ok(Self { id: id.into(), secret });
            }
        }
        Err(Error::crypto("failed to generate a P-256 scalar"))
    }

    pub(crate) fn diffie_hellman(&self, peer: &PublicJwk) -> Result<Zeroizing<Vec<u8>>> {
        if peer.crv != "P-256" {
            return Err(Error::crypto(format!(
                "expected a P-256 public key, got crv {}",
                peer.crv
            )));
        }
        let x = base64url_decode(&peer.x)
            .map_err(|_| Error::crypto("invalid P-256 x-coordinate encoding"))?;
        let y = peer
            .y
            .as_deref()
            .ok_or_else(|| Error::crypto("P-256 public key is missing its y-coordinate"))?;
        let y = base64url_decode(y)
            .map_err(|_| Error::crypto("invalid P-256 y-coordinate encoding"))?;
        if x.len() != 32 || y.len() != 32 {
            return Err(Error::crypto("P-256 coordinates must be 32 bytes"));
        }

        let point = p256::EncodedPoint::from_affine_coordinates(
            p256::FieldBytes::from_slice(&x),
            p256::FieldBytes::from_slice(&y),
            false,
        );
        let peer_key: Option<p256::PublicKey> =
            p256::PublicKey::from_encoded_point(&point).into();
        let peer_key =
            peer_key.ok_or_else(|| Error::crypto("P-256 public key is not on the curve"))?;

        let shared = p256::ecdh::diffie_hellman(
            self.secret.to_nonzero_scalar(),
            peer_key.as_affine(),
        );
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

#[async_trait]
impl KeyAgreementKey for P256KeyPair {
    fn id(&self) -> &str {
        &self.id
    }

    fn key_type(&self) -> &str {
        P256_KEY_TYPE
    }

    fn public_jwk(&self) -> PublicJwk {
        let point = self.secret.public_key().to_encoded_point(false);
        PublicJwk {
            kty: "EC".into(),
            crv: "P-256".into(),
            x: base64url_encode(point.x().map(|x| x.as_slice()).unwrap_or_default()),
            y: Some(base64url_encode(point.y().map(|y| y.as_slice()).unwrap_or_default())),
            kid: (!self.id.is_empty()).then(|| self.id.clone()),
        }
    }

    async fn derive_secret(&self, public: &PublicJwk) -> Result<Vec<u8>> {
        Ok(self.diffie_hellman(public)?.to_vec())
    }
}
