//! Document trash status machine.
//!
//! `not_trashed -> trashing -> trashed` and `trashed -> restoring ->
//! not_trashed`. Each transition is set optimistically before the backend
//! call resolves, then settled against the node's authoritative trashed
//! flag (which also rolls back a failed call).

/// Trash status of the document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashState {
    NotTrashed,
    Trashing,
    Trashed,
    Restoring,
}

impl TrashState {
    /// Map the store's authoritative flag to a settled state.
    pub fn from_flag(trashed: bool) -> Self {
        if trashed {
            TrashState::Trashed
        } else {
            TrashState::NotTrashed
        }
    }

    /// Whether a backend call is in flight for this state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, TrashState::Trashing | TrashState::Restoring)
    }

    /// Optimistic transition for a trash request. Returns `None` if trashing
    /// is not legal from this state.
    pub fn begin_trash(&self) -> Option<TrashState> {
        match self {
            TrashState::NotTrashed => Some(TrashState::Trashing),
            _ => None,
        }
    }

    /// Optimistic transition for a restore request.
    pub fn begin_restore(&self) -> Option<TrashState> {
        match self {
            TrashState::Trashed => Some(TrashState::Restoring),
            _ => None,
        }
    }
}
