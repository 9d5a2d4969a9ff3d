//! Typed handle the controller uses to call into the editor surface.
//!
//! Thin wrapper over the invocation bridge: one method per editor RPC, with
//! binary results decoded out of the reply envelope. Sequencing between
//! calls (e.g. show after initial content) is the controller's job.

use super::protocol::{EditorRequest, ExportFormat};
use super::{BridgeError, InvocationBridge};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::sync::Arc;

/// Handle to the embedded editor's RPC surface.
#[derive(Clone)]
pub struct EditorHandle {
    bridge: Arc<InvocationBridge>,
}

impl EditorHandle {
    pub fn new(bridge: Arc<InvocationBridge>) -> Self {
        Self { bridge }
    }

    pub async fn show(&self) -> Result<(), BridgeError> {
        self.bridge.invoke(EditorRequest::Show).await.map(|_| ())
    }

    pub async fn hide(&self) -> Result<(), BridgeError> {
        self.bridge.invoke(EditorRequest::Hide).await.map(|_| ())
    }

    /// Deliver an update payload (a single update or a squashed
    /// representation) to the editor.
    pub async fn receive_update(&self, content: Bytes) -> Result<(), BridgeError> {
        self.bridge
            .invoke(EditorRequest::ReceiveUpdate { content })
            .await
            .map(|_| ())
    }

    pub async fn receive_theme(&self, theme: &str) -> Result<(), BridgeError> {
        self.bridge
            .invoke(EditorRequest::ReceiveTheme {
                theme: theme.to_string(),
            })
            .await
            .map(|_| ())
    }

    pub async fn change_locked_state(&self, locked: bool) -> Result<(), BridgeError> {
        self.bridge
            .invoke(EditorRequest::ChangeLockedState { locked })
            .await
            .map(|_| ())
    }

    /// Fetch the editor's full document state (base64 in the reply).
    pub async fn get_document_state(&self) -> Result<Bytes, BridgeError> {
        let value = self.bridge.invoke(EditorRequest::GetDocumentState).await?;
        decode_bytes_reply(value)
    }

    /// Ask the editor to export the document in the given format.
    pub async fn export_data(&self, format: ExportFormat) -> Result<Bytes, BridgeError> {
        let value = self
            .bridge
            .invoke(EditorRequest::ExportData { format })
            .await?;
        decode_bytes_reply(value)
    }

    pub async fn print_as_pdf(&self) -> Result<(), BridgeError> {
        self.bridge
            .invoke(EditorRequest::PrintAsPdf)
            .await
            .map(|_| ())
    }

    pub async fn reload_comments_list(&self) -> Result<(), BridgeError> {
        self.bridge
            .invoke(EditorRequest::ReloadCommentsList)
            .await
            .map(|_| ())
    }

    pub async fn show_comment_thread(&self, thread_id: &str) -> Result<(), BridgeError> {
        self.bridge
            .invoke(EditorRequest::ShowCommentThread {
                thread_id: thread_id.to_string(),
            })
            .await
            .map(|_| ())
    }
}

fn decode_bytes_reply(value: serde_json::Value) -> Result<Bytes, BridgeError> {
    let encoded = value.as_str().ok_or_else(|| {
        BridgeError::RemoteFailure("expected base64 string reply".to_string())
    })?;
    STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|e| BridgeError::RemoteFailure(format!("bad base64 in reply: {e}")))
}
