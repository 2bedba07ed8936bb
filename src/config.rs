//! Crate-wide configuration and cryptographic constants.
//!
//! This module defines the core constants used throughout the client, including:
//! - JOSE algorithm identifiers for the two cipher suites
//! - Document identifier layout (multibase/multihash framing)
//! - Limits enforced by the document engine (sequence ceiling, query limits)
//! - Cache and chunking defaults
//!
//! These constants ensure consistency across the codebase and serve as the single
//! source of truth for the wire format the client produces.

/// Key-wrap algorithm identifier carried in every JWE recipient header.
pub const ALG_ECDH_ES_A256KW: &str = "ECDH-ES+A256KW";

/// Content-encryption identifier for the recommended suite
/// (X25519 key agreement, XChaCha20-Poly1305 content encryption).
pub const ENC_XC20P: &str = "XC20P";

/// Content-encryption identifier for the FIPS suite
/// (P-256 key agreement, AES-256-GCM content encryption).
pub const ENC_A256GCM: &str = "A256GCM";

/// Size of a content-encryption key in bytes.
///
/// Both suites use 256-bit keys.
pub const CEK_SIZE: usize = 32;

/// Nonce size for XChaCha20-Poly1305 in bytes.
///
/// The extended 24-byte nonce allows random nonces without collision risk,
/// unlike standard ChaCha20's 12-byte nonce.
pub const XC20P_NONCE_SIZE: usize = 24;

/// Nonce size for AES-GCM in bytes.
///
/// Standard 12 bytes (96 bits) as recommended by NIST SP 800-38D.
pub const A256GCM_NONCE_SIZE: usize = 12;

/// Size of the Poly1305/GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Length of a wrapped content-encryption key in bytes.
///
/// AES-KW output for a 32-byte key: 32 bytes of key plus an 8-byte
/// integrity check value.
pub const WRAPPED_CEK_SIZE: usize = 40;

/// Size of the HMAC-SHA-256 output in bytes.
pub const HMAC_SIZE: usize = 32;

/// Default size of plaintext stream chunks in bytes (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1_048_576;

/// Capacity of the per-engine HMAC output cache.
///
/// Compound-index construction and stream writes sign the same inputs
/// repeatedly; a small LRU keeps those round trips off the signer.
pub const HMAC_CACHE_CAPACITY: usize = 1000;

/// Number of random bytes in a document identifier.
pub const DOC_ID_SIZE: usize = 16;

/// Multihash identity function code, the first framing byte of a document ID.
pub const MULTIHASH_IDENTITY: u8 = 0x00;

/// Multibase prefix for base58-btc, the first character of an encoded ID.
pub const MULTIBASE_BASE58: char = 'z';

/// Largest integer exactly representable in an IEEE-754 double (2^53 - 1).
///
/// Sequence numbers interoperate with JSON consumers that parse numbers as
/// doubles, so the engine enforces `sequence < MAX_SAFE_INTEGER - 1`.
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Smallest accepted query result limit.
pub const MIN_QUERY_LIMIT: u32 = 1;

/// Largest accepted query result limit.
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Key type carried by HMAC identities produced by [`crate::keys::InMemoryHmac`].
pub const HMAC_KEY_TYPE: &str = "Sha256HmacKey2019";

/// Key type for X25519 key-agreement keys.
pub const X25519_KEY_TYPE: &str = "X25519KeyAgreementKey2020";

/// Key type for P-256 key-agreement keys.
pub const P256_KEY_TYPE: &str = "P256KeyAgreementKey2021";
