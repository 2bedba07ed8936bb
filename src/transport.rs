//! Transport contract.
//!
//! The engine treats the transport as opaque: HTTPS, capability-invocation
//! signing, and retry logic all live behind this trait. Implementations
//! must normalize their failures into the canonical error kinds before
//! returning (409 on insert is `Duplicate`, 409 elsewhere is
//! `InvalidState`, 404 is `NotFound`, connection-level failures are
//! `Network`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::{Chunk, EncryptedDocument, IndexEntry, KeyRef};

/// A blinded query as it crosses the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// HMAC identity whose index is consulted.
    pub index: String,
    /// OR-ed clauses of blinded name/value pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equals: Vec<BTreeMap<String, String>>,
    /// Blinded names whose existence is checked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub count: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Results of a `find` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResults {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<EncryptedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// Configuration of one vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdvConfig {
    /// Server-assigned vault identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub controller: String,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac: Option<KeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_agreement_key: Option<KeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

/// Operations a vault server must expose.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn create_edv(&self, config: EdvConfig) -> Result<EdvConfig>;

    async fn get_config(&self, id: &str) -> Result<EdvConfig>;

    async fn update_config(&self, config: EdvConfig) -> Result<()>;

    async fn find_configs(&self, controller: &str) -> Result<Vec<EdvConfig>>;

    /// Stores a new encrypted document. Duplicate IDs and unique-attribute
    /// collisions are `Duplicate`.
    async fn insert(&self, document: &EncryptedDocument) -> Result<()>;

    /// Replaces an encrypted document. A sequence mismatch is
    /// `InvalidState`.
    async fn update(&self, document: &EncryptedDocument) -> Result<()>;

    /// Replaces one index entry without rewriting the document. A stale
    /// entry sequence is `InvalidState`.
    async fn update_index(&self, doc_id: &str, entry: &IndexEntry) -> Result<()>;

    async fn get(&self, id: &str) -> Result<EncryptedDocument>;

    async fn find(&self, query: &Query) -> Result<FindResults>;

    /// Stores one stream chunk, keyed by `(doc_id, chunk.index)`. Retries
    /// with identical content are permitted to overwrite.
    async fn store_chunk(&self, doc_id: &str, chunk: &Chunk) -> Result<()>;

    async fn get_chunk(&self, doc_id: &str, index: u64) -> Result<Chunk>;

    async fn revoke_capability(&self, capability: &Value) -> Result<()>;
}
