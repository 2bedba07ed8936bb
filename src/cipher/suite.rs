//! Cipher suites and per-recipient key wrapping.
//!
//! Two suites are selectable at construction: the recommended suite pairs
//! X25519 key agreement with XChaCha20-Poly1305 content encryption
//! (`XC20P`); the FIPS suite pairs P-256 with AES-256-GCM (`A256GCM`).
//! Recipients always use ECDH-ES+A256KW: an ephemeral key per recipient,
//! Concat KDF, then AES-KW around the content-encryption key.

use aes_kw::Kek;
use zeroize::Zeroizing;

use crate::cipher::aes_gcm::AesGcmCipher;
use crate::cipher::envelope::{JweRecipient, RecipientHeader};
use crate::cipher::kdf::concat_kdf;
use crate::cipher::xc20p::Xc20pCipher;
use crate::config::{ALG_ECDH_ES_A256KW, CEK_SIZE, ENC_A256GCM, ENC_XC20P, WRAPPED_CEK_SIZE};
use crate::error::{Error, Result};
use crate::keys::agreement::{P256KeyPair, PublicJwk, X25519KeyPair};
use crate::keys::{KeyAgreementKey, KeyResolver};
use crate::primitives::encoding::{base64url_decode, base64url_encode};
use crate::primitives::random_bytes;

/// Selects the cipher suite an engine encrypts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuiteVersion {
    /// X25519 + XChaCha20-Poly1305.
    #[default]
    Recommended,
    /// P-256 + AES-256-GCM.
    Fips,
}

impl SuiteVersion {
    /// The JOSE content-encryption identifier carried in `protected`.
    pub fn enc(self) -> &'static str {
        match self {
            Self::Recommended => ENC_XC20P,
            Self::Fips => ENC_A256GCM,
        }
    }

    /// Recovers the suite from a content-encryption identifier.
    pub fn from_enc(enc: &str) -> Result<Self> {
        match enc {
            ENC_XC20P => Ok(Self::Recommended),
            ENC_A256GCM => Ok(Self::Fips),
            other => Err(Error::decryption(format!(
                "unsupported content encryption algorithm: {other}"
            ))),
        }
    }

    /// The key-agreement curve this suite wraps recipients with.
    pub fn crv(self) -> &'static str {
        match self {
            Self::Recommended => "X25519",
            Self::Fips => "P-256",
        }
    }
}

/// Content cipher selected by suite, shared by object and stream paths.
pub(crate) enum ContentCipher {
    Xc20p(Xc20pCipher),
    A256Gcm(AesGcmCipher),
}

impl ContentCipher {
    pub(crate) fn new(version: SuiteVersion, key: &[u8; CEK_SIZE]) -> Self {
        match version {
            SuiteVersion::Recommended => Self::Xc20p(Xc20pCipher::new(key)),
            SuiteVersion::Fips => Self::A256Gcm(AesGcmCipher::new(key)),
        }
    }

    pub(crate) fn encrypt(
        &self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        match self {
            Self::Xc20p(cipher) => cipher.encrypt(plaintext, aad),
            Self::A256Gcm(cipher) => cipher.encrypt(plaintext, aad),
        }
    }

    pub(crate) fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            Self::Xc20p(cipher) => cipher.decrypt(nonce, ciphertext, tag, aad),
            Self::A256Gcm(cipher) => cipher.decrypt(nonce, ciphertext, tag, aad),
        }
    }
}

/// Generates a fresh content-encryption key.
pub(crate) fn generate_cek() -> Result<Zeroizing<[u8; CEK_SIZE]>> {
    Ok(Zeroizing::new(random_bytes()?))
}

/// Wraps `cek` for one recipient, producing its completed JWE recipient
/// record with ephemeral key and party info.
pub(crate) async fn wrap_recipient(
    version: SuiteVersion,
    cek: &[u8; CEK_SIZE],
    header: &RecipientHeader,
    resolver: &dyn KeyResolver,
) -> Result<JweRecipient> {
    if header.alg != ALG_ECDH_ES_A256KW {
        return Err(Error::invalid_argument(format!(
            "unsupported key agreement algorithm: {}",
            header.alg
        )));
    }

    let peer = resolver.resolve(&header.kid).await?;
    if peer.crv != version.crv() {
        return Err(Error::invalid_argument(format!(
            "recipient key curve {} does not match suite curve {}",
            peer.crv,
            version.crv()
        )));
    }

    let (shared, mut epk) = ephemeral_agreement(version, &peer)?;
    epk.kid = None;

    // PartyUInfo is the ephemeral public key, PartyVInfo the recipient id.
    let apu = epk.x.clone();
    let apv = base64url_encode(header.kid.as_bytes());
    let kek = concat_kdf(&shared, ALG_ECDH_ES_A256KW, &base64url_decode(&apu)?, header.kid.as_bytes());

    let mut wrapped = [0u8; WRAPPED_CEK_SIZE];
    Kek::from(kek)
        .wrap(cek, &mut wrapped)
        .map_err(|e| Error::crypto(format!("AES-KW wrap failed: {e:?}")))?;

    Ok(JweRecipient {
        header: RecipientHeader {
            kid: header.kid.clone(),
            alg: header.alg.clone(),
            apu: Some(apu),
            apv: Some(apv),
            epk: Some(epk),
        },
        encrypted_key: base64url_encode(&wrapped),
    })
}

/// Unwraps the content-encryption key from whichever recipient record
/// matches the supplied key-agreement key.
pub(crate) async fn unwrap_cek(
    recipients: &[JweRecipient],
    kak: &dyn KeyAgreementKey,
) -> Result<Zeroizing<[u8; CEK_SIZE]>> {
    for recipient in recipients {
        if recipient.header.kid != kak.id() || recipient.header.alg != ALG_ECDH_ES_A256KW {
            continue;
        }
        let Some(epk) = &recipient.header.epk else {
            continue;
        };

        let shared = Zeroizing::new(kak.derive_secret(epk).await?);
        let apu = match &recipient.header.apu {
            Some(apu) => base64url_decode(apu)?,
            None => base64url_decode(&epk.x)?,
        };
        let apv = match &recipient.header.apv {
            Some(apv) => base64url_decode(apv)?,
            None => kak.id().as_bytes().to_vec(),
        };
        let kek = concat_kdf(&shared, &recipient.header.alg, &apu, &apv);

        let wrapped = base64url_decode(&recipient.encrypted_key)?;
        if wrapped.len() != WRAPPED_CEK_SIZE {
            return Err(Error::decryption(format!(
                "wrapped key must be {WRAPPED_CEK_SIZE} bytes, got {}",
                wrapped.len()
            )));
        }

        let mut cek = Zeroizing::new([0u8; CEK_SIZE]);
        Kek::from(kek)
            .unwrap(&wrapped, &mut cek[..])
            .map_err(|_| Error::decryption("AES-KW unwrap failed"))?;
        return Ok(cek);
    }

    Err(Error::decryption(format!(
        "no recipient matches key {}",
        kak.id()
    )))
}

fn ephemeral_agreement(
    version: SuiteVersion,
    peer: &PublicJwk,
) -> Result<(Zeroizing<Vec<u8>>, PublicJwk)> {
    match version {
        SuiteVersion::Recommended => {
            let ephemeral = X25519KeyPair::generate("")?;
            let shared = ephemeral.diffie_hellman(peer)?;
            Ok((shared, ephemeral.public_jwk()))
        }
        SuiteVersion::Fips => {
            let ephemeral = P256KeyPair::generate("")?;
            let shared = ephemeral.diffie_hellman(peer)?;
            Ok((shared, ephemeral.public_jwk()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticResolver;

    fn header(kid: &str) -> RecipientHeader {
        RecipientHeader {
            kid: kid.into(),
            alg: ALG_ECDH_ES_A256KW.into(),
            apu: None,
            apv: None,
            epk: None,
        }
    }

    #[tokio::test]
    async fn test_wrap_unwrap_x25519() {
        let kak = X25519KeyPair::generate("did:key:bob#ka").unwrap();
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let cek = generate_cek().unwrap();
        let recipient = wrap_recipient(
            SuiteVersion::Recommended,
            &cek,
            &header("did:key:bob#ka"),
            &resolver,
        )
        .await
        .unwrap();

        assert!(recipient.header.epk.is_some());
        assert!(recipient.header.apu.is_some());

        let unwrapped = unwrap_cek(std::slice::from_ref(&recipient), &kak).await.unwrap();
        assert_eq!(*unwrapped, *cek);
    }

    #[tokio::test]
    async fn test_wrap_unwrap_p256() {
        let kak = P256KeyPair::generate("did:key:bob#ka").unwrap();
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let cek = generate_cek().unwrap();
        let recipient =
            wrap_recipient(SuiteVersion::Fips, &cek, &header("did:key:bob#ka"), &resolver)
                .await
                .unwrap();

        let unwrapped = unwrap_cek(std::slice::from_ref(&recipient), &kak).await.unwrap();
        assert_eq!(*unwrapped, *cek);
    }

    #[tokio::test]
    async fn test_unwrap_wrong_key_fails() {
        let kak = X25519KeyPair::generate("did:key:bob#ka").unwrap();
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let cek = generate_cek().unwrap();
        let recipient = wrap_recipient(
            SuiteVersion::Recommended,
            &cek,
            &header("did:key:bob#ka"),
            &resolver,
        )
        .await
        .unwrap();

        let other = X25519KeyPair::generate("did:key:eve#ka").unwrap();
        assert!(unwrap_cek(std::slice::from_ref(&recipient), &other).await.is_err());
    }

    #[tokio::test]
    async fn test_curve_mismatch_rejected() {
        let kak = P256KeyPair::generate("did:key:bob#ka").unwrap();
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let cek = generate_cek().unwrap();
        let result = wrap_recipient(
            SuiteVersion::Recommended,
            &cek,
            &header("did:key:bob#ka"),
            &resolver,
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_enc_roundtrip() {
        assert_eq!(
            SuiteVersion::from_enc(SuiteVersion::Recommended.enc()).unwrap(),
            SuiteVersion::Recommended
        );
        assert_eq!(
            SuiteVersion::from_enc(SuiteVersion::Fips.enc()).unwrap(),
            SuiteVersion::Fips
        );
        assert!(SuiteVersion::from_enc("A128GCM").is_err());
    }
}
