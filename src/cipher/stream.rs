//! Chunked stream encryption and decryption.
//!
//! A stream is a lazy, finite byte sequence. The encryptor re-chunks it to
//! a fixed size and seals each chunk with one shared content-encryption
//! key; the key is generated and wrapped for the recipients exactly once,
//! and the wrapped set travels in the first chunk's envelope only. Chunks
//! are produced and consumed strictly in order.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use zeroize::Zeroizing;

use crate::cipher::envelope::{self, Cipher, Jwe, JweRecipient, Recipient};
use crate::cipher::suite::{self, ContentCipher, SuiteVersion};
use crate::config::{CEK_SIZE, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::keys::{KeyAgreementKey, KeyResolver};
use crate::primitives::encoding::base64url_encode;

/// One encrypted chunk, before the engine attaches the document sequence.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub index: u64,
    pub jwe: Jwe,
}

/// Transforms a lazy plaintext byte stream into encrypted chunk records.
pub struct StreamEncryptor {
    cipher: ContentCipher,
    protected: String,
    recipients: Vec<JweRecipient>,
    chunk_size: usize,
}

impl StreamEncryptor {
    /// Prepares a stream cipher: generates the shared CEK and wraps it for
    /// every recipient up front.
    pub async fn new(
        version: SuiteVersion,
        recipients: &[Recipient],
        resolver: &dyn KeyResolver,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(Error::invalid_argument("chunk size must be positive"));
        }

        let (cek, wrapped) = Cipher::new(version).wrap_for(recipients, resolver).await?;
        Ok(Self {
            cipher: ContentCipher::new(version, &cek),
            protected: envelope::encode_protected(version)?,
            recipients: wrapped,
            chunk_size,
        })
    }

    fn seal(&mut self, index: u64, chunk: &[u8]) -> Result<ChunkRecord> {
        let (iv, ciphertext, tag) = self.cipher.encrypt(chunk, self.protected.as_bytes())?;
        // The wrapped recipient set travels once, on the first chunk.
        let recipients = if index == 0 { std::mem::take(&mut self.recipients) } else { Vec::new() };
        Ok(ChunkRecord {
            index,
            jwe: Jwe {
                protected: self.protected.clone(),
                recipients,
                iv: base64url_encode(&iv),
                ciphertext: base64url_encode(&ciphertext),
                tag: base64url_encode(&tag),
            },
        })
    }

    /// Consumes `source`, yielding `ceil(len / chunk_size)` sealed chunks.
    pub fn encrypt<S>(self, source: S) -> impl Stream<Item = Result<ChunkRecord>> + Send
    where
        S: Stream<Item = Result<Vec<u8>>> + Send + Unpin + 'static,
    {
        struct State<S> {
            encryptor: StreamEncryptor,
            source: S,
            buffer: Vec<u8>,
            index: u64,
            done: bool,
        }

        let state = State { encryptor: self, source, buffer: Vec::new(), index: 0, done: false };

        futures::stream::try_unfold(state, |mut state| async move {
            loop {
                if state.buffer.len() >= state.encryptor.chunk_size {
                    let rest = state.buffer.split_off(state.encryptor.chunk_size);
                    let chunk = std::mem::replace(&mut state.buffer, rest);
                    let record = state.encryptor.seal(state.index, &chunk)?;
                    state.index += 1;
                    return Ok(Some((record, state)));
                }

                if state.done {
                    if state.buffer.is_empty() {
                        return Ok(None);
                    }
                    let chunk = std::mem::take(&mut state.buffer);
                    let record = state.encryptor.seal(state.index, &chunk)?;
                    state.index += 1;
                    return Ok(Some((record, state)));
                }

                match state.source.next().await {
                    Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(e),
                    None => state.done = true,
                }
            }
        })
    }
}

/// Transforms a stream of encrypted chunk envelopes back into plaintext
/// bytes.
///
/// The content-encryption key is unwrapped from the first chunk and
/// reused for the rest.
pub struct StreamDecryptor {
    kak: Arc<dyn KeyAgreementKey>,
}

impl StreamDecryptor {
    pub fn new(kak: Arc<dyn KeyAgreementKey>) -> Self {
        Self { kak }
    }

    pub fn decrypt<S>(self, chunks: S) -> impl Stream<Item = Result<Vec<u8>>> + Send
    where
        S: Stream<Item = Result<Jwe>> + Send + Unpin + 'static,
    {
        struct State<S> {
            kak: Arc<dyn KeyAgreementKey>,
            chunks: S,
            cipher: Option<ContentCipher>,
        }

        let state = State { kak: self.kak, chunks, cipher: None };

        futures::stream::try_unfold(state, |mut state| async move {
            let Some(jwe) = state.chunks.next().await else {
                return Ok(None);
            };
            let jwe = jwe?;

            if state.cipher.is_none() {
                let version = envelope::parse_protected(&jwe.protected)?;
                let cek: Zeroizing<[u8; CEK_SIZE]> =
                    suite::unwrap_cek(&jwe.recipients, state.kak.as_ref()).await?;
                state.cipher = Some(ContentCipher::new(version, &cek));
            }

            let cipher = state.cipher.as_ref().expect("cipher initialized above");
            let plaintext = envelope::decrypt_with(cipher, &jwe)?;
            Ok(Some((plaintext, state)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{StaticResolver, X25519KeyPair};
    use crate::primitives::random_bytes;

    async fn roundtrip(payload: &[u8], chunk_size: Option<usize>) -> (usize, Vec<u8>) {
        let kak = Arc::new(X25519KeyPair::generate("did:key:bob#ka").unwrap());
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let encryptor = StreamEncryptor::new(
            SuiteVersion::Recommended,
            &[Recipient::for_key_agreement("did:key:bob#ka")],
            &resolver,
            chunk_size,
        )
        .await
        .unwrap();

        let source = futures::stream::iter(vec![Ok(payload.to_vec())]);
        let records: Vec<ChunkRecord> = encryptor
            .encrypt(source)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        let count = records.len();
        let envelopes = futures::stream::iter(records.into_iter().map(|r| Ok(r.jwe)));
        let plaintext: Vec<Vec<u8>> = StreamDecryptor::new(kak)
            .decrypt(envelopes)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        (count, plaintext.concat())
    }

    #[tokio::test]
    async fn test_small_payload_is_one_chunk() {
        let payload: [u8; 50] = random_bytes().unwrap();
        let (chunks, restored) = roundtrip(&payload, None).await;
        assert_eq!(chunks, 1);
        assert_eq!(restored, payload);
    }

    #[tokio::test]
    async fn test_chunk_count_is_ceiling() {
        let payload = vec![7u8; 50];
        let (chunks, restored) = roundtrip(&payload, Some(16)).await;
        assert_eq!(chunks, 4); // ceil(50 / 16)
        assert_eq!(restored, payload);

        let payload = vec![7u8; 32];
        let (chunks, _) = roundtrip(&payload, Some(16)).await;
        assert_eq!(chunks, 2); // exact multiple, no trailing chunk
    }

    #[tokio::test]
    async fn test_empty_stream_has_no_chunks() {
        let (chunks, restored) = roundtrip(&[], Some(16)).await;
        assert_eq!(chunks, 0);
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_recipients_travel_on_first_chunk_only() {
        let kak = Arc::new(X25519KeyPair::generate("did:key:bob#ka").unwrap());
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let encryptor = StreamEncryptor::new(
            SuiteVersion::Recommended,
            &[Recipient::for_key_agreement("did:key:bob#ka")],
            &resolver,
            Some(8),
        )
        .await
        .unwrap();

        let source = futures::stream::iter(vec![Ok(vec![1u8; 24])]);
        let records: Vec<ChunkRecord> = encryptor
            .encrypt(source)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(!records[0].jwe.recipients.is_empty());
        assert!(records[1].jwe.recipients.is_empty());
        assert!(records[2].jwe.recipients.is_empty());
    }

    #[tokio::test]
    async fn test_tampered_chunk_fails() {
        let kak = Arc::new(X25519KeyPair::generate("did:key:bob#ka").unwrap());
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let encryptor = StreamEncryptor::new(
            SuiteVersion::Recommended,
            &[Recipient::for_key_agreement("did:key:bob#ka")],
            &resolver,
            Some(8),
        )
        .await
        .unwrap();

        let source = futures::stream::iter(vec![Ok(vec![1u8; 16])]);
        let mut records: Vec<ChunkRecord> = encryptor
            .encrypt(source)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        records[1].jwe.ciphertext = records[0].jwe.ciphertext.clone();

        let envelopes = futures::stream::iter(records.into_iter().map(|r| Ok(r.jwe)));
        let results: Vec<Result<Vec<u8>>> =
            StreamDecryptor::new(kak).decrypt(envelopes).collect().await;
        assert!(results.iter().any(Result::is_err));
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let kak = Arc::new(X25519KeyPair::generate("did:key:bob#ka").unwrap());
        let resolver = StaticResolver::new().with_key("did:key:bob#ka", kak.public_jwk());

        let encryptor = StreamEncryptor::new(
            SuiteVersion::Recommended,
            &[Recipient::for_key_agreement("did:key:bob#ka")],
            &resolver,
            None,
        )
        .await
        .unwrap();

        let source = futures::stream::iter(vec![
            Ok(vec![1u8; 4]),
            Err(Error::Network("reader failed".into())),
        ]);
        let results: Vec<Result<ChunkRecord>> = encryptor.encrypt(source).collect().await;
        assert!(results.iter().any(Result::is_err));
    }
}
