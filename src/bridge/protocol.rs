//! Wire contract for the host/editor invocation bridge.
//!
//! Only structured messages cross the boundary, never direct references.
//! Both request directions are closed serde-tagged enums, so adding a method
//! is a compile-time-checked change on both sides rather than a stringly
//! typed lookup.

use crate::update::DocumentUpdate;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serde helper: binary payloads inside JSON envelopes travel as base64.
pub mod b64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Export formats the editor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Docx,
    Html,
    Markdown,
    Txt,
    Pdf,
}

/// Where an editor-originated update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Typed by the user in the editor.
    Editor,
    /// Produced by a document conversion (e.g. import).
    Conversion,
}

/// Requests the controller can make of the editor surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EditorRequest {
    Show,
    Hide,
    ReceiveUpdate {
        #[serde(with = "b64_bytes")]
        content: Bytes,
    },
    ReceiveTheme {
        theme: String,
    },
    ChangeLockedState {
        locked: bool,
    },
    GetDocumentState,
    ExportData {
        format: ExportFormat,
    },
    PrintAsPdf,
    ReloadCommentsList,
    ShowCommentThread {
        thread_id: String,
    },
}

/// Requests the editor can make of the host controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum HostRequest {
    PropagateUpdate {
        update: DocumentUpdate,
        source: UpdateSource,
    },
    ReportError {
        message: String,
    },
    CreateCommentThread {
        content: String,
    },
    ReplyToThread {
        thread_id: String,
        content: String,
    },
    ResolveThread {
        thread_id: String,
    },
    BroadcastPresence {
        #[serde(with = "b64_bytes")]
        payload: Bytes,
    },
}

/// Reply half of a correlated invocation. Either a success value or the
/// fact of failure; the caller's future always resolves to one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub ok: bool,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyPayload {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            ok: true,
            value,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// What an envelope carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    EditorRequest(EditorRequest),
    HostRequest(HostRequest),
    Reply(ReplyPayload),
}

/// A correlated message crossing the host/editor boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub correlation_id: Uuid,
    #[serde(flatten)]
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = Envelope {
            correlation_id: Uuid::new_v4(),
            payload: Payload::EditorRequest(EditorRequest::ReceiveUpdate {
                content: Bytes::from_static(b"\x01\x02\xff"),
            }),
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn binary_payloads_are_base64_in_json() {
        let env = Envelope {
            correlation_id: Uuid::nil(),
            payload: Payload::HostRequest(HostRequest::BroadcastPresence {
                payload: Bytes::from_static(b"\x00\x01"),
            }),
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("AAE="), "expected base64 payload in {json}");
    }

    #[test]
    fn unknown_method_fails_to_deserialize() {
        let json = r#"{"correlation_id":"00000000-0000-0000-0000-000000000000","kind":"editor_request","method":"launch_missiles"}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }
}
