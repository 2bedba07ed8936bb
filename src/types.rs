//! Document model and wire shapes.
//!
//! Provides the plaintext document held by callers, the encrypted form
//! that crosses the transport, and the blinded index entries the server
//! matches against.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::Jwe;

/// A JSON object, as used for `content` and `meta`.
pub type JsonObject = serde_json::Map<String, Value>;

/// A plaintext document as seen by the caller.
///
/// Documents returned by the engine carry the server-side `jwe` and
/// `indexed` companions so that later updates can preserve recipients and
/// index entries without refetching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Multibase document identifier. Assigned on insert when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Monotonic version counter; 0 on creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// The payload.
    #[serde(default)]
    pub content: JsonObject,

    /// Application metadata; carries `{"deleted": true}` after deletion.
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub meta: JsonObject,

    /// Stream state: pending while chunks are being written, finalized to
    /// `{sequence, chunks}` once the stream is closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamInfo>,

    /// Blinded index entries, one per HMAC identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<Vec<IndexEntry>>,

    /// The JWE envelope of the stored form, preserved across updates so
    /// recipients survive without re-resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwe: Option<Jwe>,
}

impl Document {
    /// Creates a document with the given content and empty metadata.
    pub fn with_content(content: JsonObject) -> Self {
        Self { content, ..Self::default() }
    }
}

/// Stream state carried by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamInfo {
    /// Chunks are finalized; `chunks` of them exist at this `sequence`.
    Final {
        sequence: u64,
        chunks: u64,
    },
    /// A stream write is in flight.
    Pending {
        pending: bool,
    },
}

impl StreamInfo {
    /// Returns the chunk count when the stream is finalized.
    pub fn chunks(&self) -> Option<u64> {
        match self {
            Self::Final { chunks, .. } => Some(*chunks),
            Self::Pending { .. } => None,
        }
    }
}

/// The encrypted document as it crosses the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedDocument {
    pub id: String,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexed: Vec<IndexEntry>,
    pub jwe: Jwe,
    /// Present only once a stream has been finalized; never carries the
    /// pending flag on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamInfo>,
}

/// Identity of the HMAC that produced an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub id: String,
    #[serde(rename = "type")]
    pub key_type: String,
}

/// One blinded index entry, matched server-side for equality/existence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub hmac: KeyRef,
    /// Copy of the document's sequence when the entry was produced; the
    /// server rejects stale index updates against it.
    pub sequence: u64,
    pub attributes: Vec<BlindAttribute>,
}

/// A `{name, value}` pair of base64url HMAC outputs standing in for
/// plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindAttribute {
    pub name: String,
    pub value: String,
    /// Set only for attributes that participate in a unique constraint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

/// An encrypted stream chunk as it crosses the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    /// The owning document's sequence at the time the chunk was stored.
    pub sequence: u64,
    pub jwe: Jwe,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_stream_info_shapes() {
        let pending: StreamInfo = serde_json::from_value(json!({"pending": true})).unwrap();
        assert_eq!(pending, StreamInfo::Pending { pending: true });
        assert_eq!(pending.chunks(), None);

        let done: StreamInfo =
            serde_json::from_value(json!({"sequence": 1, "chunks": 3})).unwrap();
        assert_eq!(done, StreamInfo::Final { sequence: 1, chunks: 3 });
        assert_eq!(done.chunks(), Some(3));
    }

    #[test]
    fn test_unique_flag_omitted_when_false() {
        let attr = BlindAttribute {
            name: "n".into(),
            value: "v".into(),
            unique: false,
        };
        let wire = serde_json::to_value(&attr).unwrap();
        assert!(wire.get("unique").is_none());

        let unique = BlindAttribute { unique: true, ..attr };
        let wire = serde_json::to_value(&unique).unwrap();
        assert_eq!(wire["unique"], json!(true));
    }

    #[test]
    fn test_document_defaults() {
        let doc: Document = serde_json::from_value(json!({
            "content": {"a": 1}
        }))
        .unwrap();
        assert!(doc.id.is_none());
        assert!(doc.meta.is_empty());
        assert!(doc.stream.is_none());
    }
}
