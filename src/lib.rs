//! edv-client - Client core for Encrypted Data Vaults.
//!
//! Stores application documents on an untrusted server where every
//! sensitive byte is encrypted or cryptographically blinded before
//! transit:
//! - JWE document envelopes with per-recipient ECDH-ES+A256KW key wrap
//! - Two cipher suites: X25519/XChaCha20-Poly1305 and P-256/AES-256-GCM
//! - Deterministic HMAC-blinded search indexes with compound-prefix
//!   queries and array expansion
//! - Optimistic concurrency via monotonic per-document sequences
//! - Chunked, authenticated stream payloads

pub mod cipher;
pub mod config;
pub mod docid;
pub mod engine;
pub mod error;
pub mod index;
pub mod keys;
pub mod primitives;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod testkit;

pub use cipher::{Cipher, Jwe, Recipient, SuiteVersion};
pub use engine::{DocumentResults, EdvClient, FindParams};
pub use error::{Error, ErrorKind, Result};
pub use index::{IndexHelper, IndexVersion};
pub use transport::{EdvConfig, FindResults, Query, Transport};
pub use types::{Chunk, Document, EncryptedDocument, IndexEntry, StreamInfo};
