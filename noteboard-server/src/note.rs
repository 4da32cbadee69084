//! The durable note row.

use serde::{Deserialize, Serialize};

use crate::id::NoteId;

/// Allow-listed syntax tags. `syntax_change` frames naming anything else are
/// dropped.
pub const SYNTAX_ALLOW_LIST: &[&str] = &[
    "plaintext",
    "markdown",
    "javascript",
    "typescript",
    "python",
    "rust",
    "go",
    "json",
    "yaml",
    "toml",
    "html",
    "css",
    "shell",
    "sql",
];

pub const DEFAULT_SYNTAX: &str = "plaintext";

/// A persisted note row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: NoteId,
    pub content: String,
    /// Opaque Yjs binary state. Always `None` for encrypted notes.
    pub crdt_state: Option<Vec<u8>>,
    pub syntax: String,
    pub is_encrypted: bool,
    pub view_count: u64,
    pub max_views: Option<u64>,
    /// Epoch milliseconds.
    pub expires_at: Option<i64>,
    pub last_accessed_at: i64,
    pub version: u64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_editor_session: Option<String>,
}

impl Note {
    pub fn new(id: NoteId, now_ms: i64) -> Self {
        Self {
            id,
            content: String::new(),
            crdt_state: None,
            syntax: DEFAULT_SYNTAX.to_string(),
            is_encrypted: false,
            view_count: 0,
            max_views: None,
            expires_at: None,
            last_accessed_at: now_ms,
            version: 1,
            created_at: now_ms,
            updated_at: now_ms,
            last_editor_session: None,
        }
    }

    /// `expires_at = null ∨ expires_at > created_at`, `max_views = null ∨
    /// max_views ≥ 1`, `view_count ≥ 0`, `is_encrypted ⇒ crdt_state = null`.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        if let Some(expires_at) = self.expires_at
            && expires_at <= self.created_at
        {
            anyhow::bail!("expires_at must be greater than created_at");
        }
        if let Some(max_views) = self.max_views
            && max_views < 1
        {
            anyhow::bail!("max_views must be >= 1");
        }
        if self.is_encrypted && self.crdt_state.is_some() {
            anyhow::bail!("encrypted notes must not carry crdt_state");
        }
        Ok(())
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now_ms)
    }

    /// Record a view, returning whether it was the last one the note allows.
    pub fn record_view(&mut self, now_ms: i64) -> bool {
        self.view_count += 1;
        self.last_accessed_at = now_ms;
        self.max_views.is_some_and(|max| self.view_count >= max)
    }
}
