//! The document engine.
//!
//! Orchestrates the optimistic-concurrency document lifecycle: inserts,
//! sequence-checked updates, logical deletes, blinded-index queries, and
//! two-phase stream writes. All encryption happens here on the client;
//! the transport only ever sees ciphertext and blinded tokens.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use crate::cipher::{Cipher, Jwe, Recipient, StreamDecryptor, StreamEncryptor, SuiteVersion};
use crate::config::{MAX_QUERY_LIMIT, MAX_SAFE_INTEGER, MIN_QUERY_LIMIT};
use crate::docid;
use crate::error::{Error, ErrorKind, Result};
use crate::index::{IndexHelper, IndexVersion, update_indexed};
use crate::keys::{CachedResolver, HmacSigner, KeyAgreementKey, KeyResolver};
use crate::transport::{EdvConfig, FindResults, Query, Transport};
use crate::types::{Chunk, Document, EncryptedDocument, JsonObject, StreamInfo};

/// Selection criteria for [`EdvClient::find`] and [`EdvClient::count`].
///
/// Exactly one of `equals`/`has` must be set.
#[derive(Debug, Clone, Default)]
pub struct FindParams {
    /// OR-ed clauses of `attribute path -> plaintext value`.
    pub equals: Option<Vec<JsonObject>>,
    /// Attribute paths whose existence is checked.
    pub has: Option<Vec<String>>,
    pub limit: Option<u32>,
}

impl FindParams {
    /// Matches documents where every pair of `clause` is equal.
    pub fn equals(clause: JsonObject) -> Self {
        Self { equals: Some(vec![clause]), ..Self::default() }
    }

    /// Matches documents satisfying any of the given clauses.
    pub fn equals_any(clauses: Vec<JsonObject>) -> Self {
        Self { equals: Some(clauses), ..Self::default() }
    }

    /// Matches documents that have a value at `name`.
    pub fn has(name: impl Into<String>) -> Self {
        Self { has: Some(vec![name.into()]), ..Self::default() }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Decrypted results of a query.
#[derive(Debug, Default)]
pub struct DocumentResults {
    pub documents: Vec<Document>,
    pub has_more: Option<bool>,
}

/// Client for one encrypted data vault.
///
/// The engine is a value: it owns its index declarations and HMAC cache,
/// shares the key capabilities by reference, and never mutates state
/// while awaiting.
pub struct EdvClient {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn KeyResolver>,
    cipher: Cipher,
    hmac: Option<Arc<dyn HmacSigner>>,
    key_agreement_key: Option<Arc<dyn KeyAgreementKey>>,
    index: IndexHelper,
}

impl EdvClient {
    /// Creates a client over a transport and recipient key resolver,
    /// using the recommended cipher suite and the current index version.
    pub fn new(transport: Arc<dyn Transport>, resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            transport,
            resolver,
            cipher: Cipher::new(SuiteVersion::default()),
            hmac: None,
            key_agreement_key: None,
            index: IndexHelper::new(),
        }
    }

    /// Attaches the HMAC identity used for blinded indexing.
    #[must_use]
    pub fn with_hmac(mut self, hmac: Arc<dyn HmacSigner>) -> Self {
        self.hmac = Some(hmac);
        self
    }

    /// Attaches the default key-agreement key. It decrypts fetched
    /// documents and is synthesized as the recipient of new documents
    /// when the caller supplies none.
    #[must_use]
    pub fn with_key_agreement_key(mut self, kak: Arc<dyn KeyAgreementKey>) -> Self {
        self.key_agreement_key = Some(kak);
        self
    }

    /// Selects the cipher suite for newly written documents.
    #[must_use]
    pub fn with_suite(mut self, version: SuiteVersion) -> Self {
        self.cipher = Cipher::new(version);
        self
    }

    /// Selects the blinding algorithm generation. `V1` exists only for
    /// reading vaults that have not been migrated yet.
    #[must_use]
    pub fn with_index_version(mut self, version: IndexVersion) -> Self {
        self.index = IndexHelper::with_version(version);
        self
    }

    /// Declares an index over one or more attribute paths and prewarms
    /// the HMAC cache for it in the background.
    pub fn ensure_index(&self, attributes: &[&str], unique: bool) -> Result<()> {
        let hmac = self.require_hmac()?;
        let paths = self.index.ensure_index(attributes, unique)?;
        self.index.spawn_prewarm(Arc::clone(hmac), paths);
        Ok(())
    }

    /// Declares a unique index; see [`Self::ensure_index`].
    pub fn ensure_unique_index(&self, attributes: &[&str]) -> Result<()> {
        self.ensure_index(attributes, true)
    }

    /// Stores a new document. A missing `id` is generated; `sequence`
    /// starts at 0.
    ///
    /// # Errors
    /// `Duplicate` when the ID already exists or a unique attribute
    /// collides.
    pub async fn insert(&self, mut doc: Document, recipients: &[Recipient]) -> Result<Document> {
        if doc.id.is_none() {
            doc.id = Some(docid::generate_id()?);
        }
        let encrypted = self.encrypt_doc(&doc, recipients, false, None).await?;
        self.transport.insert(&encrypted).await?;
        Ok(absorb(doc, encrypted))
    }

    /// Stores a new document together with a byte stream, written as
    /// encrypted chunks of `chunk_size` (default 1 MiB).
    ///
    /// The document is first written with a pending stream marker, the
    /// chunks are posted in order, then one update finalizes the stream
    /// to `{sequence, chunks}`.
    pub async fn insert_with_stream<S>(
        &self,
        mut doc: Document,
        stream: S,
        recipients: &[Recipient],
        chunk_size: Option<usize>,
    ) -> Result<Document>
    where
        S: futures::Stream<Item = Result<Vec<u8>>> + Send + Unpin + 'static,
    {
        if doc.id.is_none() {
            doc.id = Some(docid::generate_id()?);
        }
        doc.stream = Some(StreamInfo::Pending { pending: true });

        let encrypted = self.encrypt_doc(&doc, recipients, false, None).await?;
        self.transport.insert(&encrypted).await?;
        let doc = absorb(doc, encrypted);

        self.finish_stream(doc, stream, recipients, chunk_size).await
    }

    /// Replaces a document. `doc.sequence` must match the stored value;
    /// the engine increments it by one.
    ///
    /// # Errors
    /// `InvalidState` when the server rejects the sequence.
    pub async fn update(&self, doc: Document, recipients: &[Recipient]) -> Result<Document> {
        let encrypted = self.encrypt_doc(&doc, recipients, true, None).await?;
        self.transport.update(&encrypted).await?;
        Ok(absorb(doc, encrypted))
    }

    /// Replaces a document and rewrites its stream; see
    /// [`Self::insert_with_stream`].
    pub async fn update_with_stream<S>(
        &self,
        mut doc: Document,
        stream: S,
        recipients: &[Recipient],
        chunk_size: Option<usize>,
    ) -> Result<Document>
    where
        S: futures::Stream<Item = Result<Vec<u8>>> + Send + Unpin + 'static,
    {
        doc.stream = Some(StreamInfo::Pending { pending: true });
        let encrypted = self.encrypt_doc(&doc, recipients, true, None).await?;
        self.transport.update(&encrypted).await?;
        let doc = absorb(doc, encrypted);

        self.finish_stream(doc, stream, recipients, chunk_size).await
    }

    /// Logically deletes a document: clears `content`, sets
    /// `meta.deleted`, and preserves `id`, `sequence`, and the JWE
    /// recipients.
    pub async fn delete(&self, doc: &Document) -> Result<Document> {
        let mut meta = JsonObject::new();
        meta.insert("deleted".to_string(), Value::Bool(true));
        let shadow = Document {
            id: doc.id.clone(),
            sequence: doc.sequence,
            content: JsonObject::new(),
            meta,
            stream: None,
            indexed: doc.indexed.clone(),
            jwe: doc.jwe.clone(),
        };
        self.update(shadow, &[]).await
    }

    /// Fetches and decrypts a document.
    pub async fn get(&self, id: &str) -> Result<Document> {
        docid::assert_id(id)?;
        let encrypted = self.transport.get(id).await?;
        self.decrypt_document(encrypted).await
    }

    /// Returns the plaintext byte stream of a document with a finalized
    /// stream, pulling chunks from the transport lazily and in order.
    ///
    /// # Errors
    /// `NotFound` when a chunk is missing server-side.
    pub fn get_stream(&self, doc: &Document) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let id = doc
            .id
            .clone()
            .ok_or_else(|| Error::invalid_argument("document has no id"))?;
        let chunks = match &doc.stream {
            Some(StreamInfo::Final { chunks, .. }) => *chunks,
            _ => return Err(Error::not_found("Document stream not found.")),
        };
        let kak = Arc::clone(self.require_key_agreement()?);
        let transport = Arc::clone(&self.transport);

        let source = futures::stream::try_unfold(
            (transport, id, 0u64),
            move |(transport, id, index)| async move {
                if index >= chunks {
                    return Ok(None);
                }
                let chunk = transport.get_chunk(&id, index).await.map_err(|e| {
                    if e.kind() == ErrorKind::NotFound {
                        Error::not_found("Document chunk not found.")
                    } else {
                        e
                    }
                })?;
                Ok(Some((chunk.jwe, (transport, id, index + 1))))
            },
        );
        let source: BoxStream<'static, Result<Jwe>> = Box::pin(source);
        Ok(Box::pin(StreamDecryptor::new(kak).decrypt(source)))
    }

    /// Finds documents matching `params` and decrypts them in parallel.
    pub async fn find(&self, params: FindParams) -> Result<DocumentResults> {
        let results = self.run_query(&params, false).await?;
        let documents = futures::future::try_join_all(
            results.documents.into_iter().map(|e| self.decrypt_document(e)),
        )
        .await?;
        Ok(DocumentResults { documents, has_more: results.has_more })
    }

    /// Counts documents matching `params` without fetching them.
    pub async fn count(&self, params: FindParams) -> Result<u64> {
        let results = self.run_query(&params, true).await?;
        results
            .count
            .ok_or_else(|| Error::Network("transport returned no count".to_string()))
    }

    /// Rewrites the document's index entry at its current sequence
    /// without re-encrypting the document.
    ///
    /// # Errors
    /// `InvalidState` when the entry sequence no longer matches the
    /// stored document.
    pub async fn update_index(&self, doc: &Document) -> Result<()> {
        let hmac = self.require_hmac()?;
        let id = doc
            .id
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("document has no id"))?;
        let sequence = doc
            .sequence
            .ok_or_else(|| Error::invalid_argument("document has no sequence"))?;
        let entry = self.index.update_entry(hmac, doc, sequence).await?;
        self.transport.update_index(id, &entry).await
    }

    /// Creates a vault; delegates to the transport.
    pub async fn create_edv(&self, config: EdvConfig) -> Result<EdvConfig> {
        self.transport.create_edv(config).await
    }

    /// Fetches a vault configuration; delegates to the transport.
    pub async fn get_config(&self, id: &str) -> Result<EdvConfig> {
        self.transport.get_config(id).await
    }

    /// Updates a vault configuration; delegates to the transport.
    pub async fn update_config(&self, config: EdvConfig) -> Result<()> {
        self.transport.update_config(config).await
    }

    /// Lists vault configurations by controller; delegates to the
    /// transport.
    pub async fn find_configs(&self, controller: &str) -> Result<Vec<EdvConfig>> {
        self.transport.find_configs(controller).await
    }

    /// Revokes a delegated capability; delegates to the transport.
    pub async fn revoke_capability(&self, capability: &Value) -> Result<()> {
        self.transport.revoke_capability(capability).await
    }

    fn require_hmac(&self) -> Result<&Arc<dyn HmacSigner>> {
        self.hmac.as_ref().ok_or_else(|| {
            Error::IndexingDisabled("this operation requires an HMAC identity".to_string())
        })
    }

    fn require_key_agreement(&self) -> Result<&Arc<dyn KeyAgreementKey>> {
        self.key_agreement_key.as_ref().ok_or_else(|| {
            Error::invalid_argument("this operation requires a key agreement key")
        })
    }

    async fn run_query(&self, params: &FindParams, count: bool) -> Result<FindResults> {
        let hmac = self.require_hmac()?;
        if let Some(limit) = params.limit {
            if !(MIN_QUERY_LIMIT..=MAX_QUERY_LIMIT).contains(&limit) {
                return Err(Error::invalid_argument(format!(
                    "limit must be an integer between {MIN_QUERY_LIMIT} and {MAX_QUERY_LIMIT}"
                )));
            }
        }
        let query: Query = self
            .index
            .build_query(
                hmac.as_ref(),
                params.equals.as_deref(),
                params.has.as_deref(),
                count,
                params.limit,
            )
            .await?;
        self.transport.find(&query).await
    }

    /// Produces the encrypted wire form of `doc`.
    ///
    /// Validates and advances the sequence, merges recipients, builds the
    /// index entry and the JWE in parallel, and strips plaintext from the
    /// result. `finalize_chunks` replaces the stream marker with its
    /// finalized `{sequence, chunks}` form.
    async fn encrypt_doc(
        &self,
        doc: &Document,
        recipients: &[Recipient],
        update: bool,
        finalize_chunks: Option<u64>,
    ) -> Result<EncryptedDocument> {
        let id = doc
            .id
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("document has no id"))?;
        docid::assert_id(id)?;

        let sequence = if update {
            let current = doc
                .sequence
                .ok_or_else(|| Error::invalid_argument("update requires the current sequence"))?;
            if current >= MAX_SAFE_INTEGER - 1 {
                return Err(Error::invalid_argument(format!(
                    "sequence {current} is too large"
                )));
            }
            current + 1
        } else {
            match doc.sequence {
                None | Some(0) => 0,
                Some(other) => {
                    return Err(Error::invalid_argument(format!(
                        "new documents must start at sequence 0, got {other}"
                    )));
                }
            }
        };

        let recipients = self.merge_recipients(doc, recipients)?;

        let (payload_stream, wire_stream) = match (finalize_chunks, &doc.stream) {
            (Some(chunks), _) => {
                let finalized = StreamInfo::Final { sequence, chunks };
                (Some(finalized.clone()), Some(finalized))
            }
            // A pending marker is encrypted for the writer's benefit but
            // never surfaces on the wire.
            (None, Some(StreamInfo::Pending { .. })) => (doc.stream.clone(), None),
            (None, Some(StreamInfo::Final { .. })) => (doc.stream.clone(), doc.stream.clone()),
            (None, None) => (None, None),
        };

        let mut payload = JsonObject::new();
        payload.insert("content".to_string(), Value::Object(doc.content.clone()));
        payload.insert("meta".to_string(), Value::Object(doc.meta.clone()));
        if let Some(stream) = &payload_stream {
            let stream = serde_json::to_value(stream)
                .map_err(|e| Error::crypto(format!("failed to serialize stream info: {e}")))?;
            payload.insert("stream".to_string(), stream);
        }
        let payload = Value::Object(payload);

        let resolver = CachedResolver::new(Arc::clone(&self.resolver));
        let mut indexed = doc.indexed.clone().unwrap_or_default();

        let jwe = if let Some(hmac) = &self.hmac {
            let (jwe, entry) = futures::try_join!(
                self.cipher.encrypt_object(&payload, &recipients, &resolver),
                self.index.update_entry(hmac, doc, sequence),
            )?;
            update_indexed(&mut indexed, entry);
            jwe
        } else {
            self.cipher.encrypt_object(&payload, &recipients, &resolver).await?
        };

        Ok(EncryptedDocument {
            id: id.to_string(),
            sequence,
            indexed,
            jwe,
            stream: wire_stream,
        })
    }

    /// Merges the document's existing JWE recipients with newly supplied
    /// ones, deduplicated by `(kid, alg)`; synthesizes the default
    /// key-agreement recipient when the result would otherwise be empty.
    fn merge_recipients(&self, doc: &Document, provided: &[Recipient]) -> Result<Vec<Recipient>> {
        fn push(recipient: Recipient, merged: &mut Vec<Recipient>) {
            let duplicate = merged.iter().any(|r| {
                r.header.kid == recipient.header.kid && r.header.alg == recipient.header.alg
            });
            if !duplicate {
                merged.push(recipient);
            }
        }

        let mut merged: Vec<Recipient> = Vec::new();
        if let Some(jwe) = &doc.jwe {
            for existing in &jwe.recipients {
                let mut recipient = Recipient::for_key_agreement(existing.header.kid.clone());
                recipient.header.alg = existing.header.alg.clone();
                push(recipient, &mut merged);
            }
        }
        for recipient in provided {
            push(recipient.clone(), &mut merged);
        }

        if merged.is_empty() {
            if let Some(kak) = &self.key_agreement_key {
                merged.push(Recipient::for_key_agreement(kak.id()));
            }
        }
        if merged.is_empty() {
            return Err(Error::invalid_argument(
                "recipients must be a non-empty array",
            ));
        }
        Ok(merged)
    }

    async fn decrypt_document(&self, encrypted: EncryptedDocument) -> Result<Document> {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(default)]
            content: JsonObject,
            #[serde(default)]
            meta: JsonObject,
            stream: Option<StreamInfo>,
        }

        let kak = self.require_key_agreement()?;
        let payload = self.cipher.decrypt_object(&encrypted.jwe, kak.as_ref()).await?;
        let payload: Payload = serde_json::from_value(payload)
            .map_err(|_| Error::decryption("document payload has an unexpected shape"))?;

        Ok(Document {
            id: Some(encrypted.id),
            sequence: Some(encrypted.sequence),
            content: payload.content,
            meta: payload.meta,
            stream: payload.stream,
            indexed: Some(encrypted.indexed),
            jwe: Some(encrypted.jwe),
        })
    }

    /// Second phase of a stream write: posts chunks serially at the
    /// document's current sequence, then updates the document once with
    /// the finalized stream.
    async fn finish_stream<S>(
        &self,
        mut doc: Document,
        stream: S,
        recipients: &[Recipient],
        chunk_size: Option<usize>,
    ) -> Result<Document>
    where
        S: futures::Stream<Item = Result<Vec<u8>>> + Send + Unpin + 'static,
    {
        let id = doc
            .id
            .clone()
            .ok_or_else(|| Error::invalid_argument("document has no id"))?;
        let sequence = doc
            .sequence
            .ok_or_else(|| Error::invalid_argument("document has no sequence"))?;

        let merged = self.merge_recipients(&doc, recipients)?;
        let resolver = CachedResolver::new(Arc::clone(&self.resolver));
        let encryptor =
            StreamEncryptor::new(self.cipher.version(), &merged, &resolver, chunk_size).await?;

        let mut records = Box::pin(encryptor.encrypt(stream));
        let mut chunks = 0u64;
        while let Some(record) = records.next().await {
            let record = record?;
            let index = record.index;
            let chunk = Chunk { index, sequence, jwe: record.jwe };
            self.transport.store_chunk(&id, &chunk).await?;
            chunks += 1;
            tracing::debug!(index, "stored stream chunk");
        }
        drop(records);

        doc.stream = None;
        let encrypted = self.encrypt_doc(&doc, recipients, true, Some(chunks)).await?;
        self.transport.update(&encrypted).await?;
        Ok(absorb(doc, encrypted))
    }
}

/// Folds the server-side companions of the encrypted form back into the
/// plaintext document returned to the caller.
fn absorb(mut doc: Document, encrypted: EncryptedDocument) -> Document {
    doc.sequence = Some(encrypted.sequence);
    doc.indexed = Some(encrypted.indexed);
    doc.jwe = Some(encrypted.jwe);
    if encrypted.stream.is_some() {
        doc.stream = encrypted.stream;
    }
    doc
}
