//! Narrow facade exposed to the editor bridge.
//!
//! Multiplexes the document controller and the comments/presence hub behind
//! one object. Pure delegation, no independent state; the editor never
//! obtains a direct reference to controller internals — everything goes
//! through the closed request contract.

use crate::bridge::protocol::HostRequest;
use crate::bridge::HostRequestHandler;
use crate::comments::CommentsHub;
use crate::controller::DocController;
use async_trait::async_trait;
use std::sync::Arc;

/// The single object the bridge dispatches editor-originated requests to.
pub struct OrchestratorFacade {
    controller: Arc<DocController>,
    comments: Arc<CommentsHub>,
}

impl OrchestratorFacade {
    pub fn new(controller: Arc<DocController>, comments: Arc<CommentsHub>) -> Self {
        Self {
            controller,
            comments,
        }
    }
}

#[async_trait]
impl HostRequestHandler for OrchestratorFacade {
    async fn handle(&self, request: HostRequest) -> Result<serde_json::Value, String> {
        match request {
            HostRequest::PropagateUpdate { update, source } => self
                .controller
                .editor_requests_propagation_of_update(update, source)
                .await
                .map(|()| serde_json::Value::Null)
                .map_err(|e| e.to_string()),
            HostRequest::ReportError { message } => {
                self.controller.handle_editor_reported_error(message);
                Ok(serde_json::Value::Null)
            }
            HostRequest::CreateCommentThread { content } => {
                let thread_id = self.comments.create_thread(&content);
                Ok(serde_json::json!({ "thread_id": thread_id }))
            }
            HostRequest::ReplyToThread { thread_id, content } => {
                self.comments.reply_to_thread(&thread_id, &content);
                Ok(serde_json::Value::Null)
            }
            HostRequest::ResolveThread { thread_id } => {
                self.comments.resolve_thread(&thread_id);
                Ok(serde_json::Value::Null)
            }
            HostRequest::BroadcastPresence { payload } => {
                self.comments.handle_local_presence(payload);
                Ok(serde_json::Value::Null)
            }
        }
    }
}
