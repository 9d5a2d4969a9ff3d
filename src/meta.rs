//! Document metadata and the caller's role/entitlements.
//!
//! `DocumentMeta` is mutated only by replacing the whole value
//! (copy-with-changes), never partially, to avoid aliasing bugs across
//! concurrent observers.

use crate::commit::CommitId;
use serde::{Deserialize, Serialize};

/// The caller's role on a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Viewer,
    Commenter,
    Editor,
    Admin,
}

impl Role {
    /// Whether this role may edit document content.
    pub fn can_edit(&self) -> bool {
        matches!(self, Role::Editor | Role::Admin)
    }
}

/// Identifies a document and its position in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Volume/container the document lives in.
    pub volume_id: String,
    /// Link/item id within the volume.
    pub link_id: String,
    /// Historical commit ids, oldest first. The last entry is the latest.
    pub commit_ids: Vec<CommitId>,
    /// Creation timestamp in milliseconds.
    pub created_at: u64,
    /// Last modification timestamp in milliseconds.
    pub modified_at: u64,
    /// Display name.
    pub name: String,
    /// Authoritative trashed flag from the store.
    pub trashed: bool,
    /// The caller's role on this node.
    pub role: Role,
}

impl DocumentMeta {
    /// Latest commit id, if the document has any commits.
    pub fn latest_commit_id(&self) -> Option<&CommitId> {
        self.commit_ids.last()
    }

    /// Copy with a new display name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Copy with a new latest commit appended to the history.
    pub fn with_latest_commit(&self, commit_id: CommitId) -> Self {
        let mut commit_ids = self.commit_ids.clone();
        commit_ids.push(commit_id);
        Self {
            commit_ids,
            ..self.clone()
        }
    }

    /// Copy with a new trashed flag.
    pub fn with_trashed(&self, trashed: bool) -> Self {
        Self {
            trashed,
            ..self.clone()
        }
    }

    /// Copy with a new role.
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMeta {
        DocumentMeta {
            volume_id: "vol-1".to_string(),
            link_id: "link-1".to_string(),
            commit_ids: vec![CommitId::from("c1")],
            created_at: 1000,
            modified_at: 2000,
            name: "Notes".to_string(),
            trashed: false,
            role: Role::Editor,
        }
    }

    #[test]
    fn latest_commit_is_last_in_history() {
        let m = meta().with_latest_commit(CommitId::from("c2"));
        assert_eq!(m.latest_commit_id(), Some(&CommitId::from("c2")));
        // The original value is untouched
        assert_eq!(meta().latest_commit_id(), Some(&CommitId::from("c1")));
    }

    #[test]
    fn copy_with_changes_leaves_other_fields() {
        let m = meta().with_name("Renamed");
        assert_eq!(m.name, "Renamed");
        assert_eq!(m.volume_id, "vol-1");
        assert_eq!(m.commit_ids, vec![CommitId::from("c1")]);
    }

    #[test]
    fn role_edit_entitlements() {
        assert!(Role::Editor.can_edit());
        assert!(Role::Admin.can_edit());
        assert!(!Role::Viewer.can_edit());
        assert!(!Role::Commenter.can_edit());
    }
}
