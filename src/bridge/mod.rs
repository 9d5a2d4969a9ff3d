//! Bidirectional, message-correlated RPC between the controller (host) and
//! the embedded editor surface.
//!
//! Outbound invocations register a pending oneshot keyed by correlation id
//! and suspend until the matching reply arrives. Inbound messages are origin
//! checked, then either resolved against the pending table (replies) or
//! dispatched to the host handler (requests). A handler error never prevents
//! the reply from being sent and never crashes the bridge.
//!
//! The bridge imposes no timeout and no cross-call ordering; both are the
//! caller's responsibility.

pub mod editor;
pub mod protocol;

use async_trait::async_trait;
use protocol::{Envelope, HostRequest, Payload, ReplyPayload};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

pub use editor::EditorHandle;
pub use protocol::{EditorRequest, ExportFormat, UpdateSource};

/// Error from bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("bridge port closed: {0}")]
    PortClosed(String),
    #[error("bridge torn down before reply arrived")]
    TornDown,
    #[error("remote handler failed: {0}")]
    RemoteFailure(String),
}

/// The message channel crossing the process/context boundary.
///
/// `post` must deliver the serialized envelope to the other side;
/// `expected_origin` identifies the only peer whose inbound messages are
/// accepted.
pub trait BridgePort: Send + Sync {
    fn post(&self, message: String) -> Result<(), BridgeError>;
    fn expected_origin(&self) -> &str;
}

/// Dispatch table for editor-originated requests. A closed, versioned
/// contract: the request enum is exhaustive, so handlers cannot be looked up
/// by arbitrary strings.
#[async_trait]
pub trait HostRequestHandler: Send + Sync {
    async fn handle(&self, request: HostRequest) -> Result<serde_json::Value, String>;
}

/// The correlation-id RPC layer.
pub struct InvocationBridge {
    port: Arc<dyn BridgePort>,
    handler: Arc<dyn HostRequestHandler>,
    /// Pending outbound invocations. Never held across an await.
    pending: Mutex<HashMap<Uuid, oneshot::Sender<ReplyPayload>>>,
}

impl InvocationBridge {
    pub fn new(port: Arc<dyn BridgePort>, handler: Arc<dyn HostRequestHandler>) -> Self {
        Self {
            port,
            handler,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Invoke a method on the editor and await its reply.
    ///
    /// Replies are matched purely by correlation id; there is no guarantee
    /// they arrive in the order requests were sent.
    pub async fn invoke(
        &self,
        request: protocol::EditorRequest,
    ) -> Result<serde_json::Value, BridgeError> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending table poisoned")
            .insert(correlation_id, tx);

        let envelope = Envelope {
            correlation_id,
            payload: Payload::EditorRequest(request),
        };
        let message = serde_json::to_string(&envelope)?;
        if let Err(e) = self.port.post(message) {
            self.pending
                .lock()
                .expect("pending table poisoned")
                .remove(&correlation_id);
            return Err(e);
        }

        let reply = rx.await.map_err(|_| BridgeError::TornDown)?;
        if reply.ok {
            Ok(reply.value)
        } else {
            Err(BridgeError::RemoteFailure(
                reply.error.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }

    /// Handle a raw inbound message from the boundary.
    ///
    /// Mismatched-origin messages are dropped (logged, not thrown). Requests
    /// always get a reply envelope, even when the handler fails.
    pub async fn handle_incoming(&self, origin: &str, raw: &str) {
        if origin != self.port.expected_origin() {
            warn!(origin, "dropping bridge message from unexpected origin");
            return;
        }

        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(env) => env,
            Err(e) => {
                warn!("dropping undecodable bridge message: {e}");
                return;
            }
        };

        match envelope.payload {
            Payload::Reply(reply) => {
                let sender = self
                    .pending
                    .lock()
                    .expect("pending table poisoned")
                    .remove(&envelope.correlation_id);
                match sender {
                    // The awaiting caller may have been dropped; that's fine.
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!(
                        correlation_id = %envelope.correlation_id,
                        "reply with no pending invocation"
                    ),
                }
            }
            Payload::HostRequest(request) => {
                let reply = match self.handler.handle(request).await {
                    Ok(value) => ReplyPayload::success(value),
                    Err(e) => {
                        warn!("host request handler failed: {e}");
                        ReplyPayload::failure(e)
                    }
                };
                let envelope = Envelope {
                    correlation_id: envelope.correlation_id,
                    payload: Payload::Reply(reply),
                };
                match serde_json::to_string(&envelope) {
                    Ok(message) => {
                        if let Err(e) = self.port.post(message) {
                            warn!("failed to post reply envelope: {e}");
                        }
                    }
                    Err(e) => warn!("failed to serialize reply envelope: {e}"),
                }
            }
            Payload::EditorRequest(_) => {
                warn!("editor-bound request arrived on the host side; dropping");
            }
        }
    }

    /// Number of invocations still awaiting replies.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending table poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::EditorRequest;
    use std::sync::Mutex as StdMutex;

    /// Port that records posted envelopes for inspection.
    struct RecordingPort {
        origin: String,
        posted: StdMutex<Vec<String>>,
    }

    impl RecordingPort {
        fn new(origin: &str) -> Self {
            Self {
                origin: origin.to_string(),
                posted: StdMutex::new(Vec::new()),
            }
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut self.posted.lock().unwrap())
        }
    }

    impl BridgePort for RecordingPort {
        fn post(&self, message: String) -> Result<(), BridgeError> {
            self.posted.lock().unwrap().push(message);
            Ok(())
        }

        fn expected_origin(&self) -> &str {
            &self.origin
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl HostRequestHandler for EchoHandler {
        async fn handle(&self, request: HostRequest) -> Result<serde_json::Value, String> {
            match request {
                HostRequest::ReportError { message } => Err(message),
                other => Ok(serde_json::json!({ "handled": format!("{other:?}") })),
            }
        }
    }

    fn bridge_with_port() -> (Arc<InvocationBridge>, Arc<RecordingPort>) {
        let port = Arc::new(RecordingPort::new("editor-frame"));
        let bridge = Arc::new(InvocationBridge::new(port.clone(), Arc::new(EchoHandler)));
        (bridge, port)
    }

    fn reply_for(posted: &str, value: serde_json::Value) -> String {
        let env: Envelope = serde_json::from_str(posted).unwrap();
        serde_json::to_string(&Envelope {
            correlation_id: env.correlation_id,
            payload: Payload::Reply(ReplyPayload::success(value)),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn concurrent_invocations_correlate_replies_out_of_order() {
        let (bridge, port) = bridge_with_port();

        let b1 = bridge.clone();
        let first = tokio::spawn(async move { b1.invoke(EditorRequest::GetDocumentState).await });
        let b2 = bridge.clone();
        let second = tokio::spawn(async move { b2.invoke(EditorRequest::Show).await });

        // Wait until both requests hit the port.
        let posted = loop {
            if port.posted.lock().unwrap().len() == 2 {
                break port.take();
            }
            tokio::task::yield_now().await;
        };

        // Scheduling decides posting order, so match envelopes by method.
        let find = |needle: &str| {
            posted
                .iter()
                .find(|p| p.contains(needle))
                .expect("request not posted")
                .clone()
        };
        let for_first = find("get_document_state");
        let for_second = find("\"show\"");

        // Reply in reverse order with distinct values.
        bridge
            .handle_incoming(
                "editor-frame",
                &reply_for(&for_second, serde_json::json!("for-second")),
            )
            .await;
        bridge
            .handle_incoming(
                "editor-frame",
                &reply_for(&for_first, serde_json::json!("for-first")),
            )
            .await;

        assert_eq!(first.await.unwrap().unwrap(), serde_json::json!("for-first"));
        assert_eq!(
            second.await.unwrap().unwrap(),
            serde_json::json!("for-second")
        );
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn mismatched_origin_is_silently_dropped() {
        let (bridge, port) = bridge_with_port();

        let raw = serde_json::to_string(&Envelope {
            correlation_id: Uuid::new_v4(),
            payload: Payload::HostRequest(HostRequest::ReportError {
                message: "boom".to_string(),
            }),
        })
        .unwrap();

        bridge.handle_incoming("evil-frame", &raw).await;
        // No reply was sent for the dropped message.
        assert!(port.take().is_empty());
    }

    #[tokio::test]
    async fn handler_failure_still_sends_a_reply() {
        let (bridge, port) = bridge_with_port();

        let raw = serde_json::to_string(&Envelope {
            correlation_id: Uuid::new_v4(),
            payload: Payload::HostRequest(HostRequest::ReportError {
                message: "editor exploded".to_string(),
            }),
        })
        .unwrap();

        bridge.handle_incoming("editor-frame", &raw).await;

        let posted = port.take();
        assert_eq!(posted.len(), 1);
        let env: Envelope = serde_json::from_str(&posted[0]).unwrap();
        match env.payload {
            Payload::Reply(reply) => {
                assert!(!reply.ok);
                assert_eq!(reply.error.as_deref(), Some("editor exploded"));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_reply_is_ignored() {
        let (bridge, _port) = bridge_with_port();
        let raw = serde_json::to_string(&Envelope {
            correlation_id: Uuid::new_v4(),
            payload: Payload::Reply(ReplyPayload::success(serde_json::Value::Null)),
        })
        .unwrap();
        // Must not panic or crash the bridge.
        bridge.handle_incoming("editor-frame", &raw).await;
        assert_eq!(bridge.pending_count(), 0);
    }
}
