//! The document controller: orchestrates the commit model, the connection
//! lifecycle, the invocation bridge, and the external collaborators for a
//! single collaboratively edited document.
//!
//! The controller is the sole mutator of the current commit and the editor
//! link; cross-component communication happens through explicit events, not
//! shared mutable fields. Commit installation is last-resolved-wins: every
//! install bumps an epoch, and slow paths (stale-commit refetch, squash)
//! discard their result if the epoch moved while they were awaiting.

pub mod events;
pub mod trash;

use crate::bridge::{BridgeError, EditorHandle, ExportFormat, UpdateSource};
use crate::comments::CommentsHub;
use crate::commit::{Commit, CommitId, MergeError, UpdateMerger};
use crate::config::{DocumentKind, SyncConfig};
use crate::connection::{ConnectionLifecycle, Watchdog, WebsocketStatus};
use crate::meta::DocumentMeta;
use crate::store::{
    CommitDecrypter, CommitWriteOutcome, DecryptError, DocumentKeys, DurableStore, SquashVerifier,
    StoreError, VerificationDecision,
};
use crate::transport::{
    ConnectionEvent, DisconnectReason, RealtimeTransport, ServerEvent, TransportError,
};
use crate::update::DocumentUpdate;
use bytes::Bytes;
use events::{DocEvent, DocEventPublisher};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use trash::TrashState;

/// Error from controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to load document metadata: {0}")]
    LoadMeta(#[source] StoreError),
    #[error("failed to load document keys: {0}")]
    LoadKeys(#[source] StoreError),
    #[error("failed to load commit: {0}")]
    LoadCommit(#[source] StoreError),
    #[error("failed to decrypt commit: {0}")]
    Decrypt(#[from] DecryptError),
    #[error("failed to merge updates: {0}")]
    Merge(#[from] MergeError),
    #[error("store operation failed: {0}")]
    Store(StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("update of {size} bytes exceeds maximum {max}")]
    UpdateTooLarge { size: usize, max: usize },
    #[error("controller is not ready")]
    NotReady,
    #[error("illegal trash transition from {from:?}")]
    TrashTransition { from: TrashState },
}

/// Result of a squash attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquashOutcome {
    /// The current commit is under the threshold.
    NotNeeded,
    /// The verification decision was reject; nothing was written.
    Rejected,
    /// A new squashed commit was written.
    Squashed(CommitId),
}

/// Controller lifecycle phase. Illegal states (e.g. ready without a commit)
/// are unrepresentable.
enum ControllerPhase {
    Uninitialized,
    Loading,
    Ready { meta: DocumentMeta, commit: Commit },
    Destroyed,
}

/// Editor attachment. The pre-ready FIFO queue only exists while no editor
/// handle is registered.
enum EditorLink {
    Pending { queued: VecDeque<DocumentUpdate> },
    Attached { editor: EditorHandle },
}

struct ControllerState {
    phase: ControllerPhase,
    editor: EditorLink,
    lifecycle: ConnectionLifecycle,
    keys: Option<DocumentKeys>,
    /// Bumped on every commit install; async paths record it before
    /// awaiting and discard results if it moved.
    commit_epoch: u64,
    /// Outbound updates buffered while the transport is not connected.
    outbound_buffer: VecDeque<DocumentUpdate>,
    trash: TrashState,
    /// Set once something decided the editor should become visible.
    reveal_requested: bool,
    editor_shown: bool,
    last_published_lock: Option<bool>,
}

/// Owns a document's lifecycle end to end: load, initial commit, realtime
/// event dispatch, squash, stale-commit recovery, and the editing lock.
pub struct DocController {
    config: SyncConfig,
    kind: DocumentKind,
    volume_id: String,
    link_id: String,
    /// Local user identity, used to author squashed commits.
    author: String,
    store: Arc<dyn DurableStore>,
    decrypter: Arc<dyn CommitDecrypter>,
    merger: Arc<dyn UpdateMerger>,
    transport: Arc<dyn RealtimeTransport>,
    verifier: Arc<dyn SquashVerifier>,
    comments: Arc<CommentsHub>,
    events: DocEventPublisher,
    state: RwLock<ControllerState>,
    connect_watchdog: Watchdog,
    sync_watchdog: Watchdog,
}

#[allow(clippy::too_many_arguments)]
impl DocController {
    pub fn new(
        config: SyncConfig,
        kind: DocumentKind,
        volume_id: impl Into<String>,
        link_id: impl Into<String>,
        author: impl Into<String>,
        store: Arc<dyn DurableStore>,
        decrypter: Arc<dyn CommitDecrypter>,
        merger: Arc<dyn UpdateMerger>,
        transport: Arc<dyn RealtimeTransport>,
        verifier: Arc<dyn SquashVerifier>,
        comments: Arc<CommentsHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            kind,
            volume_id: volume_id.into(),
            link_id: link_id.into(),
            author: author.into(),
            store,
            decrypter,
            merger,
            transport,
            verifier,
            comments,
            events: DocEventPublisher::new(64),
            state: RwLock::new(ControllerState {
                phase: ControllerPhase::Uninitialized,
                editor: EditorLink::Pending {
                    queued: VecDeque::new(),
                },
                lifecycle: ConnectionLifecycle::new(),
                keys: None,
                commit_epoch: 0,
                outbound_buffer: VecDeque::new(),
                trash: TrashState::NotTrashed,
                reveal_requested: false,
                editor_shown: false,
                last_published_lock: None,
            }),
            connect_watchdog: Watchdog::new("initial-connection"),
            sync_watchdog: Watchdog::new("initial-sync"),
        })
    }

    /// Subscribe to host-facing document events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DocEvent> {
        self.events.subscribe()
    }

    /// Load metadata and the latest commit, open the realtime connection,
    /// and arm the initial-connection watchdog.
    ///
    /// Either the controller reaches `Ready` with a consistent commit, or it
    /// publishes `LoadFailure` and stays failed closed. Calling this twice
    /// is a programming error.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), ControllerError> {
        {
            let mut state = self.state.write().await;
            match state.phase {
                ControllerPhase::Uninitialized => state.phase = ControllerPhase::Loading,
                _ => panic!("DocController::initialize called twice"),
            }
        }

        let (meta, commit, keys) = match self.load_document().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("document load failed: {e}");
                self.events.publish(DocEvent::LoadFailure {
                    title: "Failed to load document".to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let commit_id = commit.id().clone();
        {
            let mut state = self.state.write().await;
            state.trash = TrashState::from_flag(meta.trashed);
            state.keys = Some(keys);
            state.phase = ControllerPhase::Ready { meta, commit };
            state.commit_epoch += 1;
            state.lifecycle.backend_ready = true;
        }
        self.recompute_editing_lock().await;
        info!(commit_id = %commit_id, "document loaded");
        self.events.publish(DocEvent::LoadSuccess {
            commit_id: commit_id.clone(),
        });

        if let Err(e) = self
            .transport
            .connect(&self.volume_id, &self.link_id, Some(&commit_id))
            .await
        {
            // Not fatal: the lifecycle machine and watchdogs take it from here.
            warn!("realtime connect failed: {e}");
        }

        let this = self.clone();
        self.connect_watchdog
            .arm(self.config.initial_connect_timeout, async move {
                warn!("initial connection timed out; showing editor without realtime");
                this.reveal_editor().await;
            });

        Ok(())
    }

    async fn load_document(
        &self,
    ) -> Result<(DocumentMeta, Commit, DocumentKeys), ControllerError> {
        let meta = self
            .store
            .load_meta(&self.volume_id, &self.link_id)
            .await
            .map_err(ControllerError::LoadMeta)?;
        let keys = self
            .store
            .load_keys(&self.volume_id, &self.link_id)
            .await
            .map_err(ControllerError::LoadKeys)?;

        match meta.latest_commit_id().cloned() {
            Some(commit_id) => {
                let raw = self
                    .store
                    .load_commit(&self.volume_id, &self.link_id, &commit_id)
                    .await
                    .map_err(ControllerError::LoadCommit)?;
                let commit = self.decrypter.decrypt(raw, &keys).await?;
                Ok((meta, commit, keys))
            }
            None => {
                let (meta, commit) = self.create_initial_commit(meta).await?;
                Ok((meta, commit, keys))
            }
        }
    }

    /// Write the document's first (empty) commit.
    async fn create_initial_commit(
        &self,
        meta: DocumentMeta,
    ) -> Result<(DocumentMeta, Commit), ControllerError> {
        let outcome = self
            .store
            .write_commit(&self.volume_id, &self.link_id, &[], None, false)
            .await
            .map_err(ControllerError::Store)?;
        match outcome {
            CommitWriteOutcome::Written { commit_id } => {
                debug!(commit_id = %commit_id, "initial commit created");
                let meta = meta.with_latest_commit(commit_id.clone());
                Ok((meta, Commit::new(commit_id, Vec::new())))
            }
            CommitWriteOutcome::VerificationRequired { .. } => Err(ControllerError::Store(
                StoreError::Rejected("verification objection on an initial commit".to_string()),
            )),
        }
    }

    /// Register the editor handle. May be called exactly once per controller
    /// instance; a second call is a programming error and panics.
    ///
    /// Updates that arrived before this call are replayed FIFO, after the
    /// current commit's squashed representation is delivered; the queue is
    /// cleared afterwards.
    pub async fn editor_is_ready_to_receive_invocations(
        &self,
        editor: EditorHandle,
    ) -> Result<(), ControllerError> {
        // The write guard is held across the replay so a concurrently
        // arriving remote update cannot overtake the queued ones.
        let mut state = self.state.write().await;
        let queued = match &mut state.editor {
            EditorLink::Attached { .. } => {
                panic!("editor handle registered twice for this controller")
            }
            EditorLink::Pending { queued } => std::mem::take(queued),
        };
        state.editor = EditorLink::Attached {
            editor: editor.clone(),
        };

        let initial = match &state.phase {
            ControllerPhase::Ready { commit, .. } => {
                match commit.squashed_representation(self.merger.as_ref()) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        self.events.publish(DocEvent::LoadFailure {
                            title: "Failed to prepare document content".to_string(),
                            message: e.to_string(),
                        });
                        return Err(ControllerError::Merge(e));
                    }
                }
            }
            _ => None,
        };

        if let Some(bytes) = initial {
            editor.receive_update(bytes).await?;
        }
        let replayed = queued.len();
        for update in queued {
            editor.receive_update(update.content).await?;
        }
        if replayed > 0 {
            debug!(replayed, "replayed queued updates to editor");
        }

        editor
            .change_locked_state(state.lifecycle.editing_locked())
            .await?;

        let reveal = state.reveal_requested && !state.editor_shown;
        if reveal {
            state.editor_shown = true;
        }
        drop(state);
        if reveal {
            editor.show().await?;
        }
        Ok(())
    }

    /// An update arrived from the realtime transport. Queued FIFO until the
    /// editor registers, forwarded directly afterwards; never reordered or
    /// deduplicated.
    pub async fn handle_remote_update(&self, update: DocumentUpdate) {
        let mut state = self.state.write().await;
        match &mut state.editor {
            EditorLink::Pending { queued } => {
                queued.push_back(update);
            }
            EditorLink::Attached { editor } => {
                let editor = editor.clone();
                // Deliver while holding the guard so ordering matches arrival.
                if let Err(e) = editor.receive_update(update.content).await {
                    warn!("failed to deliver remote update to editor: {e}");
                }
            }
        }
    }

    /// The editor wants an update propagated outward.
    ///
    /// A single update above the configured maximum is refused here — a
    /// policy decision enforced at this layer, not downstream — and any
    /// buffered outbound updates are flushed as a side effect.
    pub async fn editor_requests_propagation_of_update(
        &self,
        update: DocumentUpdate,
        source: UpdateSource,
    ) -> Result<(), ControllerError> {
        let size = update.byte_size();
        let max = self.config.max_update_bytes;
        if size > max {
            warn!(size, max, ?source, "refusing oversized update");
            self.events
                .publish(DocEvent::OversizedUpdateRejected { size, max });
            self.flush_outbound_buffer().await;
            return Err(ControllerError::UpdateTooLarge { size, max });
        }

        let connected = {
            self.state.read().await.lifecycle.status == WebsocketStatus::Connected
        };
        if !connected {
            debug!(size, "buffering update until transport connects");
            self.state.write().await.outbound_buffer.push_back(update);
            return Ok(());
        }

        match self.transport.send_update(update.content.clone()).await {
            Ok(()) => Ok(()),
            Err(TransportError::MessageTooLarge { size, max }) => {
                // Never retry the same oversized payload.
                warn!(size, max, "transport refused oversized message");
                self.flush_outbound_buffer().await;
                Err(ControllerError::Transport(TransportError::MessageTooLarge {
                    size,
                    max,
                }))
            }
            Err(e) => {
                debug!("send failed ({e}); buffering update for reconnect");
                self.state.write().await.outbound_buffer.push_back(update);
                Ok(())
            }
        }
    }

    async fn flush_outbound_buffer(&self) {
        let drained: Vec<DocumentUpdate> = {
            self.state.write().await.outbound_buffer.drain(..).collect()
        };
        for update in drained {
            if let Err(e) = self.transport.send_update(update.content).await {
                warn!("dropping buffered update: {e}");
            }
        }
    }

    /// A transport lifecycle event arrived.
    pub async fn handle_connection_event(self: &Arc<Self>, event: ConnectionEvent) {
        let reason = { self.state.write().await.lifecycle.apply(event) };

        match event {
            ConnectionEvent::Connecting => {}
            ConnectionEvent::Connected => {
                self.connect_watchdog.disarm();
                let this = self.clone();
                self.sync_watchdog
                    .arm(self.config.initial_sync_timeout, async move {
                        // Availability over strict consistency: don't block
                        // editing forever on a sync signal that never comes.
                        warn!("initial sync timed out; treating realtime channel as ready");
                        this.mark_realtime_ready().await;
                    });
                self.flush_outbound_buffer().await;
            }
            ConnectionEvent::Disconnected { .. } => {}
        }

        self.recompute_editing_lock().await;

        match reason {
            Some(DisconnectReason::StaleCommit) => {
                info!("transport reports stale commit; starting recovery");
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.refetch_commit_due_to_stale_contents().await {
                        warn!("stale-commit recovery failed: {e}");
                    }
                });
            }
            Some(DisconnectReason::PayloadTooLarge) | Some(DisconnectReason::Abuse) => {
                warn!(?reason, "transport closed the connection");
            }
            _ => {}
        }
    }

    /// The transport's ack ledger changed.
    pub async fn handle_ack_ledger_change(&self, has_errored_messages: bool) {
        {
            self.state.write().await.lifecycle.errored_sync = has_errored_messages;
        }
        self.recompute_editing_lock().await;
    }

    /// Dispatch a batch of realtime server events. The vocabulary is closed;
    /// unknown kinds never reach this far (wire decode panics).
    pub async fn handle_realtime_event(self: &Arc<Self>, events: Vec<ServerEvent>) {
        // Any server traffic means the realtime channel is live.
        self.mark_realtime_ready().await;

        for event in events {
            match event {
                ServerEvent::RequestPresenceBroadcast => {
                    self.comments.request_presence_broadcast();
                }
                ServerEvent::CommitUpdated { commit_id } => {
                    let mut state = self.state.write().await;
                    if let ControllerPhase::Ready { meta, commit } = &mut state.phase {
                        if commit.id() != &commit_id
                            && meta.latest_commit_id() != Some(&commit_id)
                        {
                            debug!(commit_id = %commit_id, "server head moved");
                            *meta = meta.with_latest_commit(commit_id);
                        }
                    }
                }
                ServerEvent::CommentMessage { payload } => {
                    self.comments.handle_comment_message(payload);
                }
                ServerEvent::PresenceBroadcast { payload } => {
                    self.comments.handle_presence_broadcast(payload);
                }
                ServerEvent::FullResync => {
                    info!("server requested a full resync");
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.refetch_commit_due_to_stale_contents().await {
                            warn!("full resync failed: {e}");
                        }
                    });
                }
                ServerEvent::Heartbeat => {}
            }
        }
    }

    async fn mark_realtime_ready(&self) {
        {
            let mut state = self.state.write().await;
            if state.lifecycle.realtime_ready && state.reveal_requested {
                return;
            }
            state.lifecycle.realtime_ready = true;
            state.reveal_requested = true;
        }
        self.sync_watchdog.disarm();
        self.recompute_editing_lock().await;
        self.reveal_editor().await;
    }

    /// Make the editor visible (once), if it is attached.
    async fn reveal_editor(&self) {
        let editor = {
            let mut state = self.state.write().await;
            state.reveal_requested = true;
            match (&state.editor, state.editor_shown) {
                (EditorLink::Attached { editor }, false) => {
                    let editor = editor.clone();
                    state.editor_shown = true;
                    Some(editor)
                }
                _ => None,
            }
        };
        if let Some(editor) = editor {
            if let Err(e) = editor.show().await {
                warn!("failed to show editor: {e}");
            }
        }
    }

    /// Recompute the editing lock from current state and propagate it if it
    /// changed. Always a full derivation, never an incremental patch.
    async fn recompute_editing_lock(&self) {
        let (locked, editor, changed) = {
            let mut state = self.state.write().await;
            let locked = state.lifecycle.editing_locked();
            let changed = state.last_published_lock != Some(locked);
            state.last_published_lock = Some(locked);
            let editor = match &state.editor {
                EditorLink::Attached { editor } => Some(editor.clone()),
                EditorLink::Pending { .. } => None,
            };
            (locked, editor, changed)
        };
        if !changed {
            return;
        }
        self.events.publish(DocEvent::EditingLockChanged { locked });
        if let Some(editor) = editor {
            if let Err(e) = editor.change_locked_state(locked).await {
                warn!("failed to propagate editing lock to editor: {e}");
            }
        }
    }

    /// Recovery path for a stale local commit: refetch metadata, and either
    /// install the newer commit and force an immediate reconnect, or — if
    /// nothing newer exists — surface an unrecoverable conflict.
    pub async fn refetch_commit_due_to_stale_contents(&self) -> Result<(), ControllerError> {
        let (current_id, epoch_before) = {
            let state = self.state.read().await;
            match &state.phase {
                ControllerPhase::Ready { commit, .. } => {
                    (commit.id().clone(), state.commit_epoch)
                }
                _ => return Err(ControllerError::NotReady),
            }
        };

        let meta = match self.store.load_meta(&self.volume_id, &self.link_id).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("stale-commit refetch failed to load metadata: {e}");
                self.publish_conflict();
                return Ok(());
            }
        };

        let latest = match meta.latest_commit_id() {
            Some(id) if *id != current_id => id.clone(),
            _ => {
                // Same commit (or none at all): recovery cannot make progress.
                warn!(current = %current_id, "refetch yielded no newer commit");
                self.publish_conflict();
                return Ok(());
            }
        };

        let keys = {
            self.state
                .read()
                .await
                .keys
                .clone()
                .ok_or(ControllerError::NotReady)?
        };
        let raw = match self
            .store
            .load_commit(&self.volume_id, &self.link_id, &latest)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("stale-commit refetch failed to load commit: {e}");
                self.publish_conflict();
                return Ok(());
            }
        };
        let commit = match self.decrypter.decrypt(raw, &keys).await {
            Ok(commit) => commit,
            Err(e) => {
                warn!("stale-commit refetch failed to decrypt: {e}");
                self.publish_conflict();
                return Ok(());
            }
        };

        let installed = {
            let mut state = self.state.write().await;
            if state.commit_epoch != epoch_before {
                // A fresher commit resolved while we were awaiting the store.
                debug!("discarding stale refetch result");
                false
            } else if let ControllerPhase::Ready {
                meta: held_meta,
                commit: held_commit,
            } = &mut state.phase
            {
                *held_meta = meta;
                *held_commit = commit;
                state.commit_epoch += 1;
                true
            } else {
                false
            }
        };

        if installed {
            info!(commit_id = %latest, "installed refetched commit");
            self.push_current_content_to_editor().await;
            // Forced resync, not a retry: skip the reconnect backoff.
            if let Err(e) = self.transport.reconnect_now(&latest).await {
                warn!("immediate reconnect failed: {e}");
            }
        }
        Ok(())
    }

    fn publish_conflict(&self) {
        self.events.publish(DocEvent::UnrecoverableConflict {
            title: "Document out of sync".to_string(),
            message: "The document could not be recovered to the latest server version"
                .to_string(),
        });
    }

    async fn push_current_content_to_editor(&self) {
        let (editor, merged) = {
            let state = self.state.read().await;
            let editor = match &state.editor {
                EditorLink::Attached { editor } => editor.clone(),
                EditorLink::Pending { .. } => return,
            };
            let merged = match &state.phase {
                ControllerPhase::Ready { commit, .. } => {
                    match commit.squashed_representation(self.merger.as_ref()) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!("failed to merge refreshed commit: {e}");
                            return;
                        }
                    }
                }
                _ => return,
            };
            (editor, merged)
        };
        if let Err(e) = editor.receive_update(merged).await {
            warn!("failed to refresh editor content: {e}");
        }
    }

    /// Squash the current commit into a new one if it is over the threshold.
    ///
    /// When the store raises a verification objection, the controller
    /// suspends on the injected decision: reject cancels the squash and
    /// leaves the prior commit untouched; accept writes the verified commit.
    pub async fn squash_document(&self) -> Result<SquashOutcome, ControllerError> {
        let (updates, prior_id, epoch_before, merged) = {
            let state = self.state.read().await;
            let ControllerPhase::Ready { commit, .. } = &state.phase else {
                return Err(ControllerError::NotReady);
            };
            let threshold = self.config.squash_threshold(self.kind);
            if !commit.needs_squash(threshold) {
                return Ok(SquashOutcome::NotNeeded);
            }
            let merged = commit.squashed_representation(self.merger.as_ref())?;
            (
                commit.updates().to_vec(),
                commit.id().clone(),
                state.commit_epoch,
                merged,
            )
        };

        let squashed_update = DocumentUpdate::new(
            merged,
            self.author.clone(),
            now_ms(),
            updates.last().map(|u| u.version).unwrap_or(1),
            Bytes::new(),
        );

        let outcome = self
            .store
            .write_commit(
                &self.volume_id,
                &self.link_id,
                std::slice::from_ref(&squashed_update),
                Some(&prior_id),
                false,
            )
            .await
            .map_err(ControllerError::Store)?;

        let commit_id = match outcome {
            CommitWriteOutcome::Written { commit_id } => commit_id,
            CommitWriteOutcome::VerificationRequired { update_count } => {
                info!(update_count, "squash requires author re-verification");
                self.events
                    .publish(DocEvent::SquashVerificationRequired { update_count });
                match self.verifier.confirm_reverification(&updates).await {
                    VerificationDecision::Reject => {
                        info!("squash cancelled by verification decision");
                        return Ok(SquashOutcome::Rejected);
                    }
                    VerificationDecision::Accept => {
                        let verified = self
                            .store
                            .write_commit(
                                &self.volume_id,
                                &self.link_id,
                                std::slice::from_ref(&squashed_update),
                                Some(&prior_id),
                                true,
                            )
                            .await
                            .map_err(ControllerError::Store)?;
                        match verified {
                            CommitWriteOutcome::Written { commit_id } => commit_id,
                            CommitWriteOutcome::VerificationRequired { .. } => {
                                return Err(ControllerError::Store(StoreError::Rejected(
                                    "verification demanded again after accept".to_string(),
                                )))
                            }
                        }
                    }
                }
            }
        };

        {
            let mut state = self.state.write().await;
            if state.commit_epoch != epoch_before {
                debug!("squash result not installed; a newer commit arrived meanwhile");
            } else if let ControllerPhase::Ready { meta, commit } = &mut state.phase {
                *commit = Commit::new(commit_id.clone(), vec![squashed_update]);
                *meta = meta.with_latest_commit(commit_id.clone());
                state.commit_epoch += 1;
            }
        }
        info!(commit_id = %commit_id, "squash completed");
        self.events.publish(DocEvent::SquashCompleted {
            commit_id: commit_id.clone(),
        });
        Ok(SquashOutcome::Squashed(commit_id))
    }

    /// Pure function of the currently held role; never cached.
    pub async fn user_can_edit(&self) -> bool {
        match &self.state.read().await.phase {
            ControllerPhase::Ready { meta, .. } => meta.role.can_edit(),
            _ => false,
        }
    }

    /// Current commit id, if the controller is ready.
    pub async fn current_commit_id(&self) -> Option<CommitId> {
        match &self.state.read().await.phase {
            ControllerPhase::Ready { commit, .. } => Some(commit.id().clone()),
            _ => None,
        }
    }

    /// Current trash state.
    pub async fn trash_state(&self) -> TrashState {
        self.state.read().await.trash
    }

    /// The editor reported an error through the bridge.
    pub fn handle_editor_reported_error(&self, message: String) {
        warn!("editor reported error: {message}");
        self.events
            .publish(DocEvent::EditorReportedError { message });
    }

    /// Rename the document.
    pub async fn rename(&self, name: &str) -> Result<(), ControllerError> {
        self.store
            .rename(&self.volume_id, &self.link_id, name)
            .await
            .map_err(ControllerError::Store)?;
        let mut state = self.state.write().await;
        if let ControllerPhase::Ready { meta, .. } = &mut state.phase {
            *meta = meta.with_name(name);
        }
        Ok(())
    }

    /// Duplicate the document, seeded with the editor's current state.
    pub async fn duplicate(&self) -> Result<DocumentMeta, ControllerError> {
        let (editor, name) = {
            let state = self.state.read().await;
            let editor = match &state.editor {
                EditorLink::Attached { editor } => editor.clone(),
                EditorLink::Pending { .. } => return Err(ControllerError::NotReady),
            };
            let name = match &state.phase {
                ControllerPhase::Ready { meta, .. } => meta.name.clone(),
                _ => return Err(ControllerError::NotReady),
            };
            (editor, name)
        };
        let seed = editor.get_document_state().await?;
        self.store
            .create_document(&self.volume_id, &format!("{name} (copy)"), Some(seed))
            .await
            .map_err(ControllerError::Store)
    }

    /// Create a new, empty sibling document in the same volume.
    pub async fn create_sibling_document(
        &self,
        name: &str,
    ) -> Result<DocumentMeta, ControllerError> {
        self.store
            .create_document(&self.volume_id, name, None)
            .await
            .map_err(ControllerError::Store)
    }

    /// Export the document in the given format via the editor.
    pub async fn export(&self, format: ExportFormat) -> Result<Bytes, ControllerError> {
        let editor = self.attached_editor().await?;
        Ok(editor.export_data(format).await?)
    }

    /// Ask the editor to print the document.
    pub async fn print(&self) -> Result<(), ControllerError> {
        let editor = self.attached_editor().await?;
        Ok(editor.print_as_pdf().await?)
    }

    async fn attached_editor(&self) -> Result<EditorHandle, ControllerError> {
        match &self.state.read().await.editor {
            EditorLink::Attached { editor } => Ok(editor.clone()),
            EditorLink::Pending { .. } => Err(ControllerError::NotReady),
        }
    }

    /// Move the document to trash. The state is set optimistically before
    /// the backend call and settled against the authoritative flag after.
    pub async fn trash(&self) -> Result<(), ControllerError> {
        self.run_trash_transition(true).await
    }

    /// Restore the document from trash.
    pub async fn restore(&self) -> Result<(), ControllerError> {
        self.run_trash_transition(false).await
    }

    async fn run_trash_transition(&self, trashed: bool) -> Result<(), ControllerError> {
        let optimistic = {
            let mut state = self.state.write().await;
            let next = if trashed {
                state.trash.begin_trash()
            } else {
                state.trash.begin_restore()
            };
            match next {
                Some(next) => {
                    let from = state.trash;
                    state.trash = next;
                    debug!(?from, ?next, "optimistic trash transition");
                    next
                }
                None => {
                    return Err(ControllerError::TrashTransition { from: state.trash })
                }
            }
        };
        self.events
            .publish(DocEvent::TrashStateChanged { state: optimistic });

        let call = self
            .store
            .set_trashed(&self.volume_id, &self.link_id, trashed)
            .await;
        if let Err(e) = &call {
            warn!("trash transition failed; settling from store: {e}");
        }

        // Re-query the node's authoritative flag: confirms the optimistic
        // transition, or rolls it back when the call failed.
        let settled = match self.store.load_meta(&self.volume_id, &self.link_id).await {
            Ok(meta) => {
                let settled = TrashState::from_flag(meta.trashed);
                let mut state = self.state.write().await;
                if let ControllerPhase::Ready { meta: held, .. } = &mut state.phase {
                    *held = meta;
                }
                state.trash = settled;
                settled
            }
            Err(e) => {
                warn!("could not confirm trash state; rolling back: {e}");
                let rollback = TrashState::from_flag(!trashed);
                self.state.write().await.trash = rollback;
                rollback
            }
        };
        self.events
            .publish(DocEvent::TrashStateChanged { state: settled });
        call.map_err(ControllerError::Store)
    }

    /// Tear the controller down: disarm watchdogs, close the transport.
    pub async fn destroy(&self) {
        self.connect_watchdog.disarm();
        self.sync_watchdog.disarm();
        {
            let mut state = self.state.write().await;
            state.phase = ControllerPhase::Destroyed;
            state.editor = EditorLink::Pending {
                queued: VecDeque::new(),
            };
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!("disconnect during destroy: {e}");
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
