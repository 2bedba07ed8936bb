//! Consumer-supplied key capabilities.
//!
//! The engine depends only on these contracts; the in-memory
//! implementations here back the test suites and small deployments.
//! Hardware or KMS-backed implementations live outside this crate.

pub mod agreement;
pub mod hmac;
pub mod resolver;

pub use agreement::{KeyAgreementKey, P256KeyPair, PublicJwk, X25519KeyPair};
pub use hmac::{HmacSigner, InMemoryHmac};
pub use resolver::{CachedResolver, KeyResolver, StaticResolver};
