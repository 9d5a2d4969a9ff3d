//! Realtime transport contract and its closed event vocabulary.
//!
//! The transport owns the wire protocol; the controller only sees lifecycle
//! events, a bounded send operation, and the closed set of server events
//! below. The event vocabulary is a versioned contract: an unknown kind on
//! the wire is a programming error, not a runtime condition.

use crate::commit::CommitId;
use async_trait::async_trait;
use bytes::Bytes;

/// Structured reason attached to a transport disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Normal closure (e.g. going away).
    Normal,
    /// Server closed the connection over an oversized payload.
    PayloadTooLarge,
    /// Server rejected the connection because the locally-held commit id no
    /// longer matches server state.
    StaleCommit,
    /// Server closed the connection for abusive traffic.
    Abuse,
}

/// Connection lifecycle events delivered by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    Disconnected { reason: DisconnectReason },
}

/// Server events delivered over an established connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Server asks this client to broadcast its presence state.
    RequestPresenceBroadcast,
    /// The document's head commit id changed on the server.
    CommitUpdated { commit_id: CommitId },
    /// Encrypted comment payload for the comments subsystem.
    CommentMessage { payload: Bytes },
    /// Another participant's presence state.
    PresenceBroadcast { payload: Bytes },
    /// Server requests a full resync of document contents.
    FullResync,
    /// Keepalive, no-op.
    Heartbeat,
}

impl ServerEvent {
    /// Decode a server event from its wire kind code.
    ///
    /// Panics on an unknown code: the vocabulary is closed and versioned, so
    /// an unrecognized kind means mismatched deployments, not data to skip.
    pub fn from_wire(kind: u16, payload: Bytes) -> Self {
        match kind {
            1 => ServerEvent::RequestPresenceBroadcast,
            2 => ServerEvent::CommitUpdated {
                commit_id: CommitId(String::from_utf8_lossy(&payload).into_owned()),
            },
            3 => ServerEvent::CommentMessage { payload },
            4 => ServerEvent::PresenceBroadcast { payload },
            5 => ServerEvent::FullResync,
            6 => ServerEvent::Heartbeat,
            other => panic!("unknown server event kind {other}: closed vocabulary out of sync"),
        }
    }
}

/// Error from transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("message of {size} bytes exceeds transport maximum {max}")]
    MessageTooLarge { size: usize, max: usize },
    #[error("not connected")]
    NotConnected,
    #[error("transport closed: {0}")]
    Closed(String),
}

/// Realtime transport for a single document session.
///
/// Connect/disconnect/server events flow back to the controller through its
/// `handle_connection_event` / `handle_realtime_event` /
/// `handle_remote_update` entry points; this trait is only the outbound half.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(
        &self,
        volume_id: &str,
        link_id: &str,
        commit_id: Option<&CommitId>,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Send one update payload. Bounded by the transport's maximum message
    /// size contract.
    async fn send_update(&self, content: Bytes) -> Result<(), TransportError>;

    /// Reconnect immediately, skipping the normal reconnect backoff. Used by
    /// stale-commit recovery, which is a forced resync rather than a retry.
    async fn reconnect_now(&self, commit_id: &CommitId) -> Result<(), TransportError>;
}
