//! Document cipher pipeline: JWE envelopes, cipher suites, and chunked
//! stream encryption.

pub mod aes_gcm;
pub mod envelope;
pub mod kdf;
pub mod stream;
pub mod suite;
pub mod xc20p;

pub use envelope::{Cipher, Jwe, JweRecipient, Recipient, RecipientHeader};
pub use stream::{ChunkRecord, StreamDecryptor, StreamEncryptor};
pub use suite::SuiteVersion;
