//! A commit in the document history: an identified, immutable, ordered list
//! of updates.
//!
//! Commits are value objects. Squashing produces a new commit with a new
//! identifier assigned by the durable store; nothing mutates in place.

use crate::update::DocumentUpdate;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque commit identifier, assigned by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Error merging a commit's updates into a single representation.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("corrupt update at index {index}: {reason}")]
    CorruptUpdate { index: usize, reason: String },
    #[error("merge primitive failed: {0}")]
    Primitive(String),
}

/// External merge primitive. Merging all updates of a commit in list order
/// must be deterministic and lossless; the internals (CRDT semantics) are
/// out of scope here.
pub trait UpdateMerger: Send + Sync {
    fn merge(&self, updates: &[DocumentUpdate]) -> Result<Bytes, MergeError>;
}

/// An immutable snapshot of document history.
#[derive(Debug, Clone)]
pub struct Commit {
    id: CommitId,
    updates: Vec<DocumentUpdate>,
    /// Sum of update byte sizes, computed once at construction. Queried on
    /// every update-arrival decision, so it must stay O(1).
    byte_size: usize,
}

impl Commit {
    /// Create a commit from updates in arrival order.
    pub fn new(id: CommitId, updates: Vec<DocumentUpdate>) -> Self {
        let byte_size = updates.iter().map(DocumentUpdate::byte_size).sum();
        Self {
            id,
            updates,
            byte_size,
        }
    }

    pub fn id(&self) -> &CommitId {
        &self.id
    }

    pub fn updates(&self) -> &[DocumentUpdate] {
        &self.updates
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Whether this commit has accumulated more updates than the active
    /// threshold allows. The threshold is a configuration input (it varies
    /// by document kind and deployment tier).
    pub fn needs_squash(&self, threshold: usize) -> bool {
        self.updates.len() > threshold
    }

    /// Merge all updates in order into the single representation used to
    /// seed or refresh the editor.
    pub fn squashed_representation(&self, merger: &dyn UpdateMerger) -> Result<Bytes, MergeError> {
        merger.merge(&self.updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(content: &[u8]) -> DocumentUpdate {
        DocumentUpdate::new(content.to_vec(), "alice", 1000, 1, vec![0u8])
    }

    /// Concatenating merger used only in tests.
    struct ConcatMerger;

    impl UpdateMerger for ConcatMerger {
        fn merge(&self, updates: &[DocumentUpdate]) -> Result<Bytes, MergeError> {
            let mut out = Vec::new();
            for u in updates {
                out.extend_from_slice(&u.content);
            }
            Ok(out.into())
        }
    }

    struct RejectingMerger;

    impl UpdateMerger for RejectingMerger {
        fn merge(&self, _updates: &[DocumentUpdate]) -> Result<Bytes, MergeError> {
            Err(MergeError::Primitive("bad byte sequence".to_string()))
        }
    }

    #[test]
    fn byte_size_is_sum_of_update_sizes() {
        let commit = Commit::new(
            CommitId::from("c1"),
            vec![update(b"abc"), update(b"de"), update(b"")],
        );
        assert_eq!(commit.byte_size(), 5);
        assert_eq!(commit.update_count(), 3);
    }

    #[test]
    fn empty_commit_has_zero_byte_size() {
        let commit = Commit::new(CommitId::from("c0"), vec![]);
        assert_eq!(commit.byte_size(), 0);
        assert_eq!(commit.update_count(), 0);
    }

    #[test]
    fn needs_squash_only_above_threshold() {
        let at_threshold = Commit::new(
            CommitId::from("c1"),
            (0..50).map(|_| update(b"x")).collect(),
        );
        assert!(!at_threshold.needs_squash(50));

        let above_threshold = Commit::new(
            CommitId::from("c2"),
            (0..51).map(|_| update(b"x")).collect(),
        );
        assert!(above_threshold.needs_squash(50));
    }

    #[test]
    fn squashed_representation_preserves_order() {
        let commit = Commit::new(
            CommitId::from("c1"),
            vec![update(b"one,"), update(b"two,"), update(b"three")],
        );
        let merged = commit.squashed_representation(&ConcatMerger).unwrap();
        assert_eq!(&merged[..], b"one,two,three");
    }

    #[test]
    fn merge_failure_propagates() {
        let commit = Commit::new(CommitId::from("c1"), vec![update(b"x")]);
        let result = commit.squashed_representation(&RejectingMerger);
        assert!(matches!(result, Err(MergeError::Primitive(_))));
    }
}
