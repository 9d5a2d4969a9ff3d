//! Collaborator contracts for the durable store and crypto layer.
//!
//! The controller consumes these as trait objects; production wiring and the
//! wire format of commits belong to the collaborators, not this crate.

use crate::commit::{Commit, CommitId};
use crate::meta::DocumentMeta;
use crate::update::DocumentUpdate;
use async_trait::async_trait;
use bytes::Bytes;

/// An encrypted commit as fetched from the durable store.
#[derive(Debug, Clone)]
pub struct RawCommit {
    pub commit_id: CommitId,
    pub encrypted: Bytes,
}

/// Opaque key material for a document. Management and rotation are the
/// crypto collaborator's problem.
#[derive(Debug, Clone)]
pub struct DocumentKeys {
    pub key_material: Bytes,
}

/// Error from durable store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    Denied(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("store rejected write: {0}")]
    Rejected(String),
}

/// Outcome of writing a commit.
///
/// Writes may come back with a distinguishable verification objection: the
/// store wants the author to re-verify old updates before the write is
/// finalized. That is a required human decision, not an error.
#[derive(Debug, Clone)]
pub enum CommitWriteOutcome {
    Written { commit_id: CommitId },
    VerificationRequired { update_count: usize },
}

/// Durable store for document metadata and commits.
///
/// Reads must be idempotent under retry.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load_meta(&self, volume_id: &str, link_id: &str) -> Result<DocumentMeta, StoreError>;

    async fn load_commit(
        &self,
        volume_id: &str,
        link_id: &str,
        commit_id: &CommitId,
    ) -> Result<RawCommit, StoreError>;

    async fn load_keys(&self, volume_id: &str, link_id: &str)
        -> Result<DocumentKeys, StoreError>;

    /// Write a commit superseding `prior_commit_id`. Pass `verified = true`
    /// only after an explicit accept decision for a verification objection.
    async fn write_commit(
        &self,
        volume_id: &str,
        link_id: &str,
        updates: &[DocumentUpdate],
        prior_commit_id: Option<&CommitId>,
        verified: bool,
    ) -> Result<CommitWriteOutcome, StoreError>;

    /// Create a new document in the volume, optionally seeded with content.
    async fn create_document(
        &self,
        volume_id: &str,
        name: &str,
        seed: Option<Bytes>,
    ) -> Result<DocumentMeta, StoreError>;

    async fn rename(&self, volume_id: &str, link_id: &str, name: &str) -> Result<(), StoreError>;

    async fn set_trashed(
        &self,
        volume_id: &str,
        link_id: &str,
        trashed: bool,
    ) -> Result<(), StoreError>;
}

/// Error decrypting a raw commit. Fatal to that load attempt; never retried
/// automatically at this layer.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("bad key material: {0}")]
    BadKeys(String),
    #[error("corrupt ciphertext: {0}")]
    Corrupt(String),
    #[error("signature verification failed for author {author}")]
    BadSignature { author: String },
}

/// Crypto collaborator that turns raw commits into usable ones.
#[async_trait]
pub trait CommitDecrypter: Send + Sync {
    async fn decrypt(&self, raw: RawCommit, keys: &DocumentKeys) -> Result<Commit, DecryptError>;
}

/// The human decision solicited when a squash write hits a verification
/// objection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationDecision {
    Accept,
    Reject,
}

/// Asks the host for an explicit accept/reject decision before a squash is
/// finalized. The controller awaits this instead of blocking a thread.
#[async_trait]
pub trait SquashVerifier: Send + Sync {
    async fn confirm_reverification(&self, updates: &[DocumentUpdate]) -> VerificationDecision;
}
