//! Comments and presence relay.
//!
//! The comments subsystem proper (threading model, encryption of comment
//! bodies) lives outside this crate; the hub only relays payloads between
//! the transport, the editor surface, and host subscribers.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Events fanned out to comment/presence subscribers.
#[derive(Debug, Clone)]
pub enum CommentEvent {
    /// Encrypted comment payload arrived from the transport.
    Message { payload: Bytes },
    /// Another participant's presence state arrived.
    Presence { payload: Bytes },
    /// The server asked this client to broadcast its presence.
    PresenceBroadcastRequested,
    /// Local presence state to push outward.
    LocalPresence { payload: Bytes },
    /// The editor created a comment thread.
    ThreadCreated { thread_id: String },
    /// The editor replied to a thread.
    ThreadReplied { thread_id: String },
    /// The editor resolved a thread.
    ThreadResolved { thread_id: String },
}

/// Relay hub for comment and presence traffic.
#[derive(Clone)]
pub struct CommentsHub {
    sender: Arc<broadcast::Sender<CommentEvent>>,
}

impl CommentsHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommentEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: CommentEvent) {
        // Ignore errors when there are no active subscribers
        let _ = self.sender.send(event);
    }

    pub fn handle_comment_message(&self, payload: Bytes) {
        self.publish(CommentEvent::Message { payload });
    }

    pub fn handle_presence_broadcast(&self, payload: Bytes) {
        self.publish(CommentEvent::Presence { payload });
    }

    pub fn request_presence_broadcast(&self) {
        self.publish(CommentEvent::PresenceBroadcastRequested);
    }

    pub fn handle_local_presence(&self, payload: Bytes) {
        self.publish(CommentEvent::LocalPresence { payload });
    }

    /// Create a comment thread and return its id.
    pub fn create_thread(&self, content: &str) -> String {
        let thread_id = Uuid::new_v4().to_string();
        debug!(thread_id, chars = content.len(), "comment thread created");
        self.publish(CommentEvent::ThreadCreated {
            thread_id: thread_id.clone(),
        });
        thread_id
    }

    pub fn reply_to_thread(&self, thread_id: &str, content: &str) {
        debug!(thread_id, chars = content.len(), "comment thread reply");
        self.publish(CommentEvent::ThreadReplied {
            thread_id: thread_id.to_string(),
        });
    }

    pub fn resolve_thread(&self, thread_id: &str) {
        self.publish(CommentEvent::ThreadResolved {
            thread_id: thread_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_thread_publishes_and_returns_id() {
        let hub = CommentsHub::new(8);
        let mut rx = hub.subscribe();
        let id = hub.create_thread("hello");
        match rx.recv().await.unwrap() {
            CommentEvent::ThreadCreated { thread_id } => assert_eq!(thread_id, id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_payloads_are_relayed() {
        let hub = CommentsHub::new(8);
        let mut rx = hub.subscribe();
        hub.handle_comment_message(Bytes::from_static(b"enc"));
        assert!(matches!(rx.recv().await.unwrap(), CommentEvent::Message { .. }));
    }
}
