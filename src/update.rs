//! A single incremental, signed change to a document's content.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An opaque, signed document update.
///
/// The content is an opaque byte payload produced by the editor; some
/// external merge primitive can combine a sequence of them losslessly as
/// long as order is preserved. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    /// Opaque update payload.
    #[serde(with = "crate::bridge::protocol::b64_bytes")]
    pub content: Bytes,

    /// Author identifier (e.g. an address or user id).
    pub author: String,

    /// Logical timestamp in milliseconds.
    pub timestamp: u64,

    /// Format version of the payload.
    pub version: u32,

    /// Cryptographic signature over the payload. Verification is delegated
    /// to the crypto collaborator; this layer only carries it.
    #[serde(with = "crate::bridge::protocol::b64_bytes")]
    pub signature: Bytes,
}

impl DocumentUpdate {
    /// Create a new update.
    pub fn new(
        content: impl Into<Bytes>,
        author: impl Into<String>,
        timestamp: u64,
        version: u32,
        signature: impl Into<Bytes>,
    ) -> Self {
        Self {
            content: content.into(),
            author: author.into(),
            timestamp,
            version,
            signature: signature.into(),
        }
    }

    /// Byte length of the content payload.
    pub fn byte_size(&self) -> usize {
        self.content.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_matches_content_length() {
        let update = DocumentUpdate::new(vec![1u8, 2, 3, 4], "alice", 1000, 1, vec![9u8]);
        assert_eq!(update.byte_size(), 4);
    }

    #[test]
    fn empty_update_has_zero_size() {
        let update = DocumentUpdate::new(Vec::<u8>::new(), "alice", 1000, 1, Vec::<u8>::new());
        assert_eq!(update.byte_size(), 0);
    }
}
