//! Session table (C6): the coordinator's private map of open connections.

use std::fmt;

use axum::extract::ws::Message;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::rate_limit::TokenBucket;

/// A session is an active editor while its last applied edit is within this
/// window of `now`.
pub const EDITOR_IDLE_WINDOW_MS: i64 = 60_000;
/// Maximum simultaneous active editors per note.
pub const ACTIVE_EDITOR_LIMIT: usize = 10;

/// Server-assigned identifier for one WebSocket connection, stable for the
/// life of that connection. Distinct from the CRDT-layer awareness client
/// id, which each browser tab picks for itself and which never appears on
/// the wire outside the opaque `awareness_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Self).map_err(serde::de::Error::custom)
    }
}

/// An open connection, as tracked by the coordinator.
///
/// The coordinator owns this value exclusively; `sender` is the only field
/// shared outward, and only so the per-connection I/O task can push frames
/// without the coordinator blocking on a slow client.
pub struct ClientSession {
    pub sender: mpsc::UnboundedSender<Message>,
    /// Client-supplied id, stable across reconnects of one browser tab.
    pub browser_session_id: String,
    pub authenticated: bool,
    pub rate_limit: TokenBucket,
    pub last_edit_at: Option<i64>,
}

impl ClientSession {
    pub fn new(sender: mpsc::UnboundedSender<Message>, browser_session_id: String, now_ms: i64) -> Self {
        Self {
            sender,
            browser_session_id,
            authenticated: true,
            rate_limit: TokenBucket::new(now_ms),
            last_edit_at: None,
        }
    }

    pub fn is_active_editor(&self, now_ms: i64) -> bool {
        self.last_edit_at.is_some_and(|t| now_ms - t <= EDITOR_IDLE_WINDOW_MS)
    }

    pub fn send(&self, message: Message) {
        // The receiving end is the per-connection write task; a closed
        // channel means that task (and the socket) is already gone, which
        // the coordinator discovers on the next disconnect sweep.
        let _ = self.sender.send(message);
    }
}

/// Insertion-ordered session table, so `connected_users` lists observe join
/// order.
#[derive(Default)]
pub struct SessionTable {
    sessions: IndexMap<SessionId, ClientSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SessionId, session: ClientSession) {
        self.sessions.insert(id, session);
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<ClientSession> {
        self.sessions.shift_remove(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&ClientSession> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut ClientSession> {
        self.sessions.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_editors(&self, now_ms: i64) -> usize {
        self.sessions.values().filter(|s| s.is_active_editor(now_ms)).count()
    }

    pub fn viewers(&self, now_ms: i64) -> usize {
        self.len() - self.active_editors(now_ms)
    }

    pub fn connected_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Broadcast to every session except `exclude`.
    pub fn broadcast_except(&self, exclude: &SessionId, message: Message) {
        for (id, session) in &self.sessions {
            if id != exclude {
                session.send(message.clone());
            }
        }
    }

    pub fn broadcast_all(&self, message: Message) {
        for session in self.sessions.values() {
            session.send(message.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &ClientSession)> {
        self.sessions.iter()
    }
}
