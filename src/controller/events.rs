//! Host-facing document events.
//!
//! Single publication mechanism for everything the host needs to observe:
//! recoverable conditions are handled internally and unrecoverable ones are
//! published here, never thrown across an async boundary where no one can
//! observe them. The host renders UI from these; this crate never does.

use crate::commit::CommitId;
use crate::controller::trash::TrashState;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events published to the host application.
#[derive(Debug, Clone)]
pub enum DocEvent {
    /// Initialization finished with a consistent commit installed.
    LoadSuccess { commit_id: CommitId },
    /// Initialization failed; the controller stays failed closed.
    LoadFailure { title: String, message: String },
    /// Stale-commit recovery could not produce a newer commit. The host
    /// decides next steps.
    UnrecoverableConflict { title: String, message: String },
    /// A squash write hit a verification objection; a decision is being
    /// solicited.
    SquashVerificationRequired { update_count: usize },
    /// A squash completed and a new commit was installed.
    SquashCompleted { commit_id: CommitId },
    /// The derived editing lock changed.
    EditingLockChanged { locked: bool },
    /// The trash state machine moved.
    TrashStateChanged { state: TrashState },
    /// An outbound update exceeded the configured maximum and was refused.
    OversizedUpdateRejected { size: usize, max: usize },
    /// The editor reported an error through the bridge.
    EditorReportedError { message: String },
}

/// Broadcast publisher with fan-out to all subscribers.
#[derive(Clone)]
pub struct DocEventPublisher {
    sender: Arc<broadcast::Sender<DocEvent>>,
}

impl DocEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DocEvent) {
        // Ignore errors when there are no active subscribers
        let _ = self.sender.send(event);
    }
}
