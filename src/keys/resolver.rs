//! Recipient key resolution.
//!
//! Recipients are named by `kid` in their JWE headers; a resolver turns a
//! `kid` into the public JWK the content-encryption key is wrapped for.
//! The engine wraps whatever resolver it is given in a per-operation
//! memoization so repeated recipients resolve exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::keys::agreement::PublicJwk;

/// Resolves a recipient `kid` to its public JWK.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str) -> Result<PublicJwk>;
}

/// Resolver over a fixed in-memory map of keys.
#[derive(Default)]
pub struct StaticResolver {
    keys: HashMap<String, PublicJwk>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key under its `kid`.
    pub fn insert(&mut self, kid: impl Into<String>, jwk: PublicJwk) {
        self.keys.insert(kid.into(), jwk);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_key(mut self, kid: impl Into<String>, jwk: PublicJwk) -> Self {
        self.insert(kid, jwk);
        self
    }
}

#[async_trait]
impl KeyResolver for StaticResolver {
    async fn resolve(&self, kid: &str) -> Result<PublicJwk> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("key not found: {kid}")))
    }
}

/// Memoizing wrapper around another resolver.
///
/// Scoped to one engine operation: a stream referencing the same set of
/// recipients for many chunks resolves each `kid` once.
pub struct CachedResolver {
    inner: Arc<dyn KeyResolver>,
    cache: Mutex<HashMap<String, PublicJwk>>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn KeyResolver>) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl KeyResolver for CachedResolver {
    async fn resolve(&self, kid: &str) -> Result<PublicJwk> {
        let mut cache = self.cache.lock().await;
        if let Some(jwk) = cache.get(kid) {
            return Ok(jwk.clone());
        }
        let jwk = self.inner.resolve(kid).await?;
        cache.insert(kid.to_string(), jwk.clone());
        Ok(jwk)
    }
}
