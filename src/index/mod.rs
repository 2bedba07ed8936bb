//! Blinded index construction.
//!
//! The helper turns declared indexes and a document into deterministic
//! HMAC-based search tokens the server can match for equality and
//! existence without learning plaintext. Simple and compound indexes,
//! prefix queries over compounds, array-valued attributes, and
//! combinatorial expansion across multi-valued matches are all handled
//! here.

pub mod attribute;
pub mod blind;
pub mod legacy;
pub mod query;

use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::config::HMAC_CACHE_CAPACITY;
use crate::error::{Error, Result};
use crate::index::attribute::{AttributePath, dereference};
use crate::index::blind::{
    HashedAttribute, SignInputs, compound_inputs, compound_name, cross_product, hash_attribute,
    simple_inputs,
};
use crate::index::legacy::{legacy_compound_inputs, legacy_compound_name, legacy_simple_inputs, legacy_stringify};
use crate::keys::HmacSigner;
use crate::primitives::encoding::base64url_encode;
use crate::primitives::sha256;
use crate::types::{BlindAttribute, Document, IndexEntry, KeyRef};

/// Which generation of the blinding algorithm an engine speaks.
///
/// `V1` exists solely so documents blinded by the first-generation
/// algorithm can be read and queried during one-shot migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexVersion {
    V1,
    #[default]
    V2,
}

#[derive(Debug, Clone)]
struct SimpleIndex {
    path: AttributePath,
    unique: bool,
}

#[derive(Debug, Clone)]
struct CompoundIndex {
    key: String,
    paths: Vec<AttributePath>,
    unique: bool,
}

/// Declaration order is preserved so emitted entries are deterministic.
#[derive(Debug, Clone, Default)]
struct Declarations {
    simple: Vec<SimpleIndex>,
    compound: Vec<CompoundIndex>,
}

type CacheKey = (String, String);
type HmacCache = Mutex<LruCache<CacheKey, Vec<u8>>>;

/// Deterministic blinded index entry and query token construction.
pub struct IndexHelper {
    version: IndexVersion,
    declarations: RwLock<Declarations>,
    cache: Arc<HmacCache>,
}

impl Default for IndexHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexHelper {
    pub fn new() -> Self {
        Self::with_version(IndexVersion::default())
    }

    pub fn with_version(version: IndexVersion) -> Self {
        let capacity =
            std::num::NonZeroUsize::new(HMAC_CACHE_CAPACITY).expect("nonzero cache capacity");
        Self {
            version,
            declarations: RwLock::new(Declarations::default()),
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    /// Declares an index over one attribute path (simple) or several
    /// (compound). Re-declaring the same index replaces it.
    ///
    /// Returns the parsed paths so the caller can prewarm against them.
    pub fn ensure_index(&self, attributes: &[&str], unique: bool) -> Result<Vec<AttributePath>> {
        if attributes.is_empty() {
            return Err(Error::invalid_argument("at least one attribute is required"));
        }
        let paths: Vec<AttributePath> = attributes
            .iter()
            .map(|a| AttributePath::parse(a))
            .collect::<Result<_>>()?;

        let mut declarations = self.declarations.write().expect("declarations lock poisoned");
        if paths.len() == 1 {
            let index = SimpleIndex { path: paths[0].clone(), unique };
            match declarations.simple.iter_mut().find(|s| s.path.raw() == paths[0].raw()) {
                Some(existing) => *existing = index,
                None => declarations.simple.push(index),
            }
        } else {
            let key = compound_key(&paths);
            let index = CompoundIndex { key: key.clone(), paths: paths.clone(), unique };
            match declarations.compound.iter_mut().find(|c| c.key == key) {
                Some(existing) => *existing = index,
                None => declarations.compound.push(index),
            }
        }
        Ok(paths)
    }

    /// Asynchronously warms the HMAC cache with the name tokens of a
    /// declared index. Failures are logged and ignored; prewarming is an
    /// optimization, never a correctness requirement.
    pub fn spawn_prewarm(&self, hmac: Arc<dyn HmacSigner>, paths: Vec<AttributePath>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let mut inputs: Vec<Vec<u8>> = Vec::new();
        match self.version {
            IndexVersion::V2 => {
                let name_hashes: Vec<[u8; 32]> =
                    paths.iter().map(|p| sha256(p.raw().as_bytes())).collect();
                inputs.extend(name_hashes.iter().map(|h| h.to_vec()));
                for k in 2..=name_hashes.len() {
                    inputs.push(compound_name(&name_hashes[..k]).to_vec());
                }
            }
            IndexVersion::V1 => {
                inputs.extend(paths.iter().map(|p| p.raw().as_bytes().to_vec()));
                let names: Vec<&str> = paths.iter().map(AttributePath::raw).collect();
                for k in 2..=names.len() {
                    inputs.push(legacy_compound_name(&names[..k]));
                }
            }
        }

        let cache = Arc::clone(&self.cache);
        handle.spawn(async move {
            for input in inputs {
                if let Err(e) = sign_cached(&cache, hmac.as_ref(), &input).await {
                    tracing::debug!("index prewarm failed: {e}");
                    return;
                }
            }
            tracing::debug!(count = paths.len(), "index prewarm complete");
        });
    }

    /// Produces the blinded index entry for `doc` under one HMAC
    /// identity, stamped with `sequence`.
    pub async fn update_entry(
        &self,
        hmac: &Arc<dyn HmacSigner>,
        doc: &Document,
        sequence: u64,
    ) -> Result<IndexEntry> {
        let declarations = self.snapshot();
        let inputs = match self.version {
            IndexVersion::V2 => build_inputs_v2(&declarations, doc),
            IndexVersion::V1 => build_inputs_v1(&declarations, doc),
        };

        // Blinding parallelizes freely across records; the cache collapses
        // repeated inputs to one signer round trip.
        let attributes = futures::future::try_join_all(inputs.iter().map(|input| async move {
            Ok::<_, Error>(BlindAttribute {
                name: base64url_encode(&sign_cached(&self.cache, hmac.as_ref(), &input.name).await?),
                value: base64url_encode(
                    &sign_cached(&self.cache, hmac.as_ref(), &input.value).await?,
                ),
                unique: input.unique,
            })
        }))
        .await?;

        Ok(IndexEntry {
            hmac: KeyRef { id: hmac.id().to_string(), key_type: hmac.key_type().to_string() },
            sequence,
            attributes,
        })
    }

    fn snapshot(&self) -> Declarations {
        self.declarations.read().expect("declarations lock poisoned").clone()
    }

    /// Declared compound indexes as raw path lists, in declaration order.
    pub(crate) fn compound_declarations(&self) -> Vec<Vec<String>> {
        self.declarations
            .read()
            .expect("declarations lock poisoned")
            .compound
            .iter()
            .map(|c| c.paths.iter().map(|p| p.raw().to_string()).collect())
            .collect()
    }

    pub(crate) async fn signed(&self, hmac: &dyn HmacSigner, data: &[u8]) -> Result<Vec<u8>> {
        sign_cached(&self.cache, hmac, data).await
    }
}

/// Replaces the entry for the same HMAC identity, or appends it.
pub fn update_indexed(indexed: &mut Vec<IndexEntry>, entry: IndexEntry) {
    match indexed.iter_mut().find(|e| e.hmac.id == entry.hmac.id) {
        Some(existing) => *existing = entry,
        None => indexed.push(entry),
    }
}

async fn sign_cached(cache: &HmacCache, hmac: &dyn HmacSigner, data: &[u8]) -> Result<Vec<u8>> {
    let key = (hmac.id().to_string(), base64url_encode(data));
    {
        let mut cache = cache.lock().await;
        if let Some(signature) = cache.get(&key) {
            return Ok(signature.clone());
        }
    }
    let signature = hmac.sign(data).await?;
    cache.lock().await.put(key, signature.clone());
    Ok(signature)
}

/// Canonical map key for a compound declaration: URL-encoded paths joined
/// with `|`.
fn compound_key(paths: &[AttributePath]) -> String {
    paths.iter().map(|p| url_encode(p.raw())).collect::<Vec<_>>().join("|")
}

fn url_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*'
            | b'\'' | b'(' | b')' => out.push(byte as char),
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

fn build_inputs_v2(declarations: &Declarations, doc: &Document) -> Vec<SignInputs> {
    let mut inputs: Vec<SignInputs> = Vec::new();

    for simple in &declarations.simple {
        for value in dereference(doc, &simple.path) {
            inputs.push(simple_inputs(&hash_attribute(simple.path.raw(), value), simple.unique));
        }
    }

    for compound in &declarations.compound {
        let lists: Vec<Vec<HashedAttribute>> = compound
            .paths
            .iter()
            .map(|path| {
                dereference(doc, path)
                    .into_iter()
                    .map(|value| hash_attribute(path.raw(), value))
                    .collect()
            })
            .collect();

        // A prefix participates only while every attribute in it has at
        // least one value.
        let present = lists.iter().take_while(|list| !list.is_empty()).count();

        for k in 1..=present {
            if k == 1 {
                // Length-1 combinations use the simple encoding; skip them
                // when a simple index already covers the attribute.
                let covered = declarations
                    .simple
                    .iter()
                    .any(|s| s.path.raw() == compound.paths[0].raw());
                if covered {
                    continue;
                }
                for hashed in &lists[0] {
                    inputs.push(simple_inputs(hashed, false));
                }
            } else {
                let unique = compound.unique && k == compound.paths.len();
                for combo in cross_product(&lists[..k]) {
                    inputs.push(compound_inputs(&combo, unique));
                }
            }
        }
    }

    dedup_inputs(inputs)
}

fn build_inputs_v1(declarations: &Declarations, doc: &Document) -> Vec<SignInputs> {
    let mut inputs: Vec<SignInputs> = Vec::new();

    for simple in &declarations.simple {
        for value in dereference(doc, &simple.path) {
            inputs.push(legacy_simple_inputs(simple.path.raw(), value, simple.unique));
        }
    }

    for compound in &declarations.compound {
        let names: Vec<&str> = compound.paths.iter().map(AttributePath::raw).collect();
        let lists: Vec<Vec<String>> = compound
            .paths
            .iter()
            .map(|path| dereference(doc, path).into_iter().map(legacy_stringify).collect())
            .collect();

        let present = lists.iter().take_while(|list| !list.is_empty()).count();

        for k in 1..=present {
            if k == 1 {
                let covered = declarations
                    .simple
                    .iter()
                    .any(|s| s.path.raw() == compound.paths[0].raw());
                if covered {
                    continue;
                }
                for value in &lists[0] {
                    inputs.push(SignInputs {
                        name: names[0].as_bytes().to_vec(),
                        value: value.clone().into_bytes(),
                        unique: false,
                    });
                }
            } else {
                let unique = compound.unique && k == compound.paths.len();
                for combo in string_cross_product(&lists[..k]) {
                    inputs.push(legacy_compound_inputs(&names[..k], &combo, unique));
                }
            }
        }
    }

    dedup_inputs(inputs)
}

fn string_cross_product(lists: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut combos: Vec<Vec<String>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for item in list {
                let mut extended = combo.clone();
                extended.push(item.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

/// Collapses records with identical sign inputs, keeping first-seen order
/// and promoting uniqueness when any duplicate carried it.
fn dedup_inputs(inputs: Vec<SignInputs>) -> Vec<SignInputs> {
    let mut out: Vec<SignInputs> = Vec::with_capacity(inputs.len());
    let mut seen: HashMap<(Vec<u8>, Vec<u8>), usize> = HashMap::new();
    for input in inputs {
        let key = (input.name.clone(), input.value.clone());
        match seen.get(&key) {
            Some(&i) => out[i].unique |= input.unique,
            None => {
                seen.insert(key, out.len());
                out.push(input);
            }
        }
    }
    out
}
