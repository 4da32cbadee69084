//! Wire frame schema: a tagged sum with one variant per `type` string —
//! unknown variants fail to deserialize and are turned into `invalid_frame`
//! by the caller, rather than panicking.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Binary payload, base64-encoded inside a JSON string on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct B64Bytes(pub Vec<u8>);

impl From<Vec<u8>> for B64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<B64Bytes> for Vec<u8> {
    fn from(value: B64Bytes) -> Self {
        value.0
    }
}

impl Serialize for B64Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for B64Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map(B64Bytes).map_err(serde::de::Error::custom)
    }
}

/// Frames accepted from a client, gated by `session.authenticated` (spec
/// §4.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    YjsUpdate { update: B64Bytes, client_id: u32 },
    AwarenessUpdate { update: B64Bytes, client_id: u32 },
    YjsStateRequest { client_id: u32 },
    SyntaxChange { syntax: String },
    RequestEdit {},
}

/// Frames the coordinator emits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    YjsSync {
        state: B64Bytes,
        seq: u64,
        client_id: SessionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        syntax: Option<String>,
    },
    YjsUpdate { update: B64Bytes, client_id: SessionId, seq: u64 },
    YjsAck { seq_num: u64 },
    AwarenessUpdate { update: B64Bytes, client_id: SessionId },
    YjsStateResponse { state: B64Bytes },
    SyntaxChange { syntax: String, client_id: SessionId, seq_num: u64 },
    SyntaxAck { seq_num: u64 },
    RequestEditResponse { can_edit: bool, active_editor_count: usize, viewer_count: usize },
    UserJoined {
        client_id: SessionId,
        connected_users: Vec<SessionId>,
        active_editor_count: usize,
        viewer_count: usize,
        seq_num: u64,
    },
    UserLeft {
        client_id: SessionId,
        connected_users: Vec<SessionId>,
        active_editor_count: usize,
        viewer_count: usize,
        seq_num: u64,
    },
    EditorCountUpdate { active_editor_count: usize, viewer_count: usize, seq_num: u64 },
    EncryptionChanged { is_encrypted: bool },
    NoteStatus { view_count: u64, max_views: Option<u64>, expires_at: Option<i64> },
    NoteDeleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    NoteExpired {},
    Error { message: String },
}

impl ServerFrame {
    pub fn to_message(&self) -> axum::extract::ws::Message {
        let json = serde_json::to_string(self).expect("ServerFrame always serializes");
        axum::extract::ws::Message::Text(json.into())
    }
}
