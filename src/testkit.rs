//! In-memory transport for engine tests.
//!
//! Implements the full transport contract against process-local maps,
//! including the server-side behaviors the engine's error handling
//! depends on: duplicate IDs, unique-attribute collisions, sequence
//! discipline on updates/index writes/chunk stores, and blinded-query
//! evaluation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::docid;
use crate::error::{Error, Result};
use crate::transport::{EdvConfig, FindResults, Query, Transport};
use crate::types::{Chunk, EncryptedDocument, IndexEntry};

#[derive(Default)]
struct State {
    configs: HashMap<String, EdvConfig>,
    docs: HashMap<String, EncryptedDocument>,
    chunks: HashMap<(String, u64), Chunk>,
    revocations: Vec<Value>,
}

/// A vault server in a box.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every stored chunk of a document, simulating server-side
    /// data loss.
    pub async fn clear_chunks(&self, doc_id: &str) {
        let mut state = self.state.lock().await;
        state.chunks.retain(|(id, _), _| id != doc_id);
    }

    /// Number of chunks currently stored for a document.
    pub async fn chunk_count(&self, doc_id: &str) -> usize {
        let state = self.state.lock().await;
        state.chunks.keys().filter(|(id, _)| id == doc_id).count()
    }

    pub async fn revocation_count(&self) -> usize {
        self.state.lock().await.revocations.len()
    }
}

fn unique_conflict(state: &State, candidate: &EncryptedDocument) -> bool {
    for entry in &candidate.indexed {
        for attribute in &entry.attributes {
            if !attribute.unique {
                continue;
            }
            let taken = state.docs.values().any(|other| {
                other.id != candidate.id
                    && other.indexed.iter().any(|e| {
                        e.hmac.id == entry.hmac.id
                            && e.attributes
                                .iter()
                                .any(|a| a.name == attribute.name && a.value == attribute.value)
                    })
            });
            if taken {
                return true;
            }
        }
    }
    false
}

fn entry_matches(entry: &IndexEntry, query: &Query) -> bool {
    if !query.equals.is_empty() {
        return query.equals.iter().any(|clause| clause_matches(entry, clause));
    }
    if !query.has.is_empty() {
        return query
            .has
            .iter()
            .all(|name| entry.attributes.iter().any(|a| a.name == *name));
    }
    false
}

fn clause_matches(entry: &IndexEntry, clause: &BTreeMap<String, String>) -> bool {
    clause.iter().all(|(name, value)| {
        entry
            .attributes
            .iter()
            .any(|a| a.name == *name && a.value == *value)
    })
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn create_edv(&self, mut config: EdvConfig) -> Result<EdvConfig> {
        let mut state = self.state.lock().await;
        let id = match config.id.clone() {
            Some(id) => id,
            None => docid::generate_id()?,
        };
        if state.configs.contains_key(&id) {
            return Err(Error::duplicate("Vault already exists."));
        }
        config.id = Some(id.clone());
        state.configs.insert(id, config.clone());
        Ok(config)
    }

    async fn get_config(&self, id: &str) -> Result<EdvConfig> {
        let state = self.state.lock().await;
        state
            .configs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Vault not found."))
    }

    async fn update_config(&self, config: EdvConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = config
            .id
            .clone()
            .ok_or_else(|| Error::invalid_argument("config has no id"))?;
        let existing = state
            .configs
            .get(&id)
            .ok_or_else(|| Error::not_found("Vault not found."))?;
        if config.sequence != existing.sequence + 1 {
            return Err(Error::invalid_state("Config sequence mismatch."));
        }
        state.configs.insert(id, config);
        Ok(())
    }

    async fn find_configs(&self, controller: &str) -> Result<Vec<EdvConfig>> {
        let state = self.state.lock().await;
        Ok(state
            .configs
            .values()
            .filter(|c| c.controller == controller)
            .cloned()
            .collect())
    }

    async fn insert(&self, document: &EncryptedDocument) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.docs.contains_key(&document.id) {
            return Err(Error::duplicate("Document already exists."));
        }
        if unique_conflict(&state, document) {
            return Err(Error::duplicate("Duplicate unique attribute value."));
        }
        state.docs.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn update(&self, document: &EncryptedDocument) -> Result<()> {
        let mut state = self.state.lock().await;
        let existing = state
            .docs
            .get(&document.id)
            .ok_or_else(|| Error::not_found("Document not found."))?;
        if document.sequence != existing.sequence + 1 {
            return Err(Error::invalid_state("Document sequence mismatch."));
        }
        if unique_conflict(&state, document) {
            return Err(Error::duplicate("Duplicate unique attribute value."));
        }
        state.docs.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn update_index(&self, doc_id: &str, entry: &IndexEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        let doc = state
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| Error::not_found("Document not found."))?;
        if entry.sequence != doc.sequence {
            return Err(Error::invalid_state("Index entry sequence mismatch."));
        }
        match doc.indexed.iter_mut().find(|e| e.hmac.id == entry.hmac.id) {
            Some(existing) => *existing = entry.clone(),
            None => doc.indexed.push(entry.clone()),
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<EncryptedDocument> {
        let state = self.state.lock().await;
        state
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Document not found."))
    }

    async fn find(&self, query: &Query) -> Result<FindResults> {
        let state = self.state.lock().await;
        let matched: Vec<&EncryptedDocument> = state
            .docs
            .values()
            .filter(|doc| {
                doc.indexed
                    .iter()
                    .filter(|entry| entry.hmac.id == query.index)
                    .any(|entry| entry_matches(entry, query))
            })
            .collect();

        if query.count {
            return Ok(FindResults {
                count: Some(matched.len() as u64),
                ..FindResults::default()
            });
        }

        let limit = query.limit.map(|l| l as usize);
        let has_more = limit.map(|l| matched.len() > l);
        let documents = matched
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(FindResults { documents, count: None, has_more })
    }

    async fn store_chunk(&self, doc_id: &str, chunk: &Chunk) -> Result<()> {
        let mut state = self.state.lock().await;
        let doc = state
            .docs
            .get(doc_id)
            .ok_or_else(|| Error::not_found("Document not found."))?;
        if chunk.sequence != doc.sequence {
            return Err(Error::invalid_state("Chunk sequence mismatch."));
        }
        state.chunks.insert((doc_id.to_string(), chunk.index), chunk.clone());
        Ok(())
    }

    async fn get_chunk(&self, doc_id: &str, index: u64) -> Result<Chunk> {
        let state = self.state.lock().await;
        state
            .chunks
            .get(&(doc_id.to_string(), index))
            .cloned()
            .ok_or_else(|| Error::not_found("Document chunk not found."))
    }

    async fn revoke_capability(&self, capability: &Value) -> Result<()> {
        let mut state = self.state.lock().await;
        state.revocations.push(capability.clone());
        Ok(())
    }
}
