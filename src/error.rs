//! Error taxonomy for the EDV client.
//!
//! Every failure the engine surfaces carries one of the canonical kinds
//! below. Transports normalize HTTP status codes into these kinds before
//! the engine ever sees them; the engine itself recovers nothing except
//! index prewarm failures.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error kinds, distinct from transport status codes.
#[derive(Debug, Error)]
pub enum Error {
    /// Insert of an existing document ID, or a unique-attribute collision
    /// observed by the server.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Sequence mismatch on update, updateIndex, or storeChunk.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Get of an absent document or chunk.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad attribute path, malformed document ID, out-of-range limit,
    /// invalid recipients, or a query with both/neither of equals and has.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// JWE authentication failure or an unwrappable content-encryption key.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// An index-dependent operation was invoked on an engine configured
    /// without an HMAC identity.
    #[error("indexing disabled: {0}")]
    IndexingDisabled(String),

    /// Transport-level failure, surfaced unchanged.
    #[error("network error: {0}")]
    Network(String),

    /// A cryptographic primitive failed (key setup, signing, key wrap).
    #[error("crypto failure: {0}")]
    Crypto(String),
}

/// Stable tags for matching on error kinds without destructuring messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Duplicate,
    InvalidState,
    NotFound,
    InvalidArgument,
    Decryption,
    IndexingDisabled,
    Network,
    Crypto,
}

impl Error {
    /// Returns the stable kind tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::IndexingDisabled(_) => ErrorKind::IndexingDisabled,
            Self::Network(_) => ErrorKind::Network,
            Self::Crypto(_) => ErrorKind::Crypto,
        }
    }

    pub(crate) fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption(message.into())
    }

    pub(crate) fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }
}
