//! JWE envelopes (general JSON serialization) over JSON objects.
//!
//! The envelope carries one wrapped content-encryption key per recipient
//! and binds the protected header as additional authenticated data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::suite::{self, ContentCipher, SuiteVersion};
use crate::config::ALG_ECDH_ES_A256KW;
use crate::error::{Error, Result};
use crate::keys::agreement::PublicJwk;
use crate::keys::{KeyAgreementKey, KeyResolver};
use crate::primitives::encoding::{base64url_decode, base64url_encode};

/// A JWE envelope in general JSON serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwe {
    /// base64url JSON `{enc}` header, bound as AAD.
    pub protected: String,
    /// One record per recipient; empty for stream chunks past the first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<JweRecipient>,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

/// A recipient record holding the wrapped content-encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JweRecipient {
    pub header: RecipientHeader,
    pub encrypted_key: String,
}

/// Per-recipient JOSE header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientHeader {
    pub kid: String,
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epk: Option<PublicJwk>,
}

/// A recipient as supplied by callers: just the `kid`/`alg` pair, before
/// the cipher fills in the ephemeral key and wrapped CEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub header: RecipientHeader,
}

impl Recipient {
    /// A recipient wrapped with ECDH-ES+A256KW for the given key id.
    pub fn for_key_agreement(kid: impl Into<String>) -> Self {
        Self {
            header: RecipientHeader {
                kid: kid.into(),
                alg: ALG_ECDH_ES_A256KW.into(),
                apu: None,
                apv: None,
                epk: None,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ProtectedHeader {
    enc: String,
}

/// Encodes the protected header for a suite.
pub(crate) fn encode_protected(version: SuiteVersion) -> Result<String> {
    let header = ProtectedHeader { enc: version.enc().to_string() };
    let json = serde_json::to_vec(&header)
        .map_err(|e| Error::crypto(format!("failed to encode protected header: {e}")))?;
    Ok(base64url_encode(&json))
}

/// Decodes a protected header and recovers its suite.
pub(crate) fn parse_protected(protected: &str) -> Result<SuiteVersion> {
    let json = base64url_decode(protected)
        .map_err(|_| Error::decryption("protected header is not valid base64url"))?;
    let header: ProtectedHeader = serde_json::from_slice(&json)
        .map_err(|_| Error::decryption("protected header is not valid JSON"))?;
    SuiteVersion::from_enc(&header.enc)
}

/// Object and stream encryption in a JWE-shaped envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cipher {
    version: SuiteVersion,
}

impl Cipher {
    pub fn new(version: SuiteVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> SuiteVersion {
        self.version
    }

    /// Encrypts a JSON object into a JWE for the given recipients.
    pub async fn encrypt_object(
        &self,
        plain: &Value,
        recipients: &[Recipient],
        resolver: &dyn KeyResolver,
    ) -> Result<Jwe> {
        let plaintext = serde_json::to_vec(plain)
            .map_err(|e| Error::crypto(format!("failed to serialize plaintext: {e}")))?;
        self.encrypt_bytes(&plaintext, recipients, resolver).await
    }

    /// Encrypts raw bytes into a JWE for the given recipients.
    pub async fn encrypt_bytes(
        &self,
        plaintext: &[u8],
        recipients: &[Recipient],
        resolver: &dyn KeyResolver,
    ) -> Result<Jwe> {
        let (cek, wrapped) = self.wrap_for(recipients, resolver).await?;
        let protected = encode_protected(self.version)?;

        let cipher = ContentCipher::new(self.version, &cek);
        let (iv, ciphertext, tag) = cipher.encrypt(plaintext, protected.as_bytes())?;

        Ok(Jwe {
            protected,
            recipients: wrapped,
            iv: base64url_encode(&iv),
            ciphertext: base64url_encode(&ciphertext),
            tag: base64url_encode(&tag),
        })
    }

    /// Generates a CEK and wraps it for every recipient.
    ///
    /// Shared with the stream path, which reuses one CEK and one wrapped
    /// recipient set across all chunks.
    pub(crate) async fn wrap_for(
        &self,
        recipients: &[Recipient],
        resolver: &dyn KeyResolver,
    ) -> Result<(zeroize::Zeroizing<[u8; crate::config::CEK_SIZE]>, Vec<JweRecipient>)> {
        if recipients.is_empty() {
            return Err(Error::invalid_argument(
                "recipients must be a non-empty array".to_string(),
            ));
        }

        let cek = suite::generate_cek()?;
        let wrapped = futures::future::try_join_all(
            recipients
                .iter()
                .map(|r| suite::wrap_recipient(self.version, &cek, &r.header, resolver)),
        )
        .await?;
        Ok((cek, wrapped))
    }

    /// Decrypts a JWE back into its JSON object.
    ///
    /// The suite is recovered from the protected header, so an engine can
    /// read documents written under either suite.
    pub async fn decrypt_object(&self, jwe: &Jwe, kak: &dyn KeyAgreementKey) -> Result<Value> {
        let plaintext = self.decrypt_bytes(jwe, kak).await?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| Error::decryption("decrypted payload is not valid JSON"))
    }

    /// Decrypts a JWE back into raw bytes.
    pub async fn decrypt_bytes(&self, jwe: &Jwe, kak: &dyn KeyAgreementKey) -> Result<Vec<u8>> {
        let version = parse_protected(&jwe.protected)?;
        let cek = suite::unwrap_cek(&jwe.recipients, kak).await?;
        let cipher = ContentCipher::new(version, &cek);
        decrypt_with(&cipher, jwe)
    }
}

/// Decrypts a JWE body with an already-unwrapped content cipher.
///
/// The stream path unwraps once and calls this per chunk.
pub(crate) fn decrypt_with(cipher: &ContentCipher, jwe: &Jwe) -> Result<Vec<u8>> {
    let iv = base64url_decode(&jwe.iv).map_err(|_| Error::decryption("invalid iv encoding"))?;
    let ciphertext = base64url_decode(&jwe.ciphertext)
        .map_err(|_| Error::decryption("invalid ciphertext encoding"))?;
    let tag = base64url_decode(&jwe.tag).map_err(|_| Error::decryption("invalid tag encoding"))?;
    cipher.decrypt(&iv, &ciphertext, &tag, jwe.protected.as_bytes())
}
