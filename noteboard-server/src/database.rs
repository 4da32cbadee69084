//! Backend file-based persistence: one JSON meta file plus one binary file
//! per note, holding the full note row and its opaque CRDT state.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tokio::fs;
use tracing::warn;

use crate::id::NoteId;
use crate::note::Note;

/// A driver for note persistence, backed by a directory of files.
///
/// Each note `N` is stored as `notes/N.json` (everything but the CRDT
/// binary) and, if present, `notes/N.crdt` (the opaque Yjs state).
#[derive(Debug, Clone)]
pub struct Database {
    storage: PathBuf,
}

impl Database {
    pub async fn new(storage: PathBuf) -> Result<Self> {
        if !storage.exists() {
            fs::create_dir_all(&storage).await?;
        }
        let this = Self { storage };
        fs::create_dir_all(this.notes_dir()).await?;
        Ok(this)
    }

    /// Construct a new database in a temporary directory for testing.
    pub async fn temporary() -> Result<Self> {
        let storage = std::env::temp_dir().join(format!("noteboard_{:x}", rand::random::<u64>()));
        Self::new(storage).await
    }

    pub async fn load(&self, id: &NoteId) -> Result<Note> {
        let meta_path = self.meta_path(id);
        if !meta_path.exists() {
            bail!("note {id} not found");
        }
        let meta = fs::read_to_string(meta_path).await?;
        let mut note: Note = serde_json::from_str(&meta)?;
        let crdt_path = self.crdt_path(id);
        if note.crdt_state.is_none() && crdt_path.exists() {
            note.crdt_state = Some(fs::read(crdt_path).await?);
        }
        Ok(note)
    }

    pub async fn store(&self, note: &Note) -> Result<()> {
        note.check_invariants().context("refusing to persist invalid note")?;
        let meta_path = self.meta_path(&note.id);
        let crdt_path = self.crdt_path(&note.id);

        // The CRDT blob can be large; keep it out of the pretty JSON file.
        let mut stripped = note.clone();
        let crdt_state = stripped.crdt_state.take();

        let json = serde_json::to_string_pretty(&stripped)?;
        let write_meta = fs::write(&meta_path, json);

        match crdt_state {
            Some(bytes) => {
                write_meta.await.context("writing note metadata")?;
                fs::write(&crdt_path, bytes).await.context("writing crdt state")?;
            }
            None => {
                write_meta.await.context("writing note metadata")?;
                if crdt_path.exists() {
                    fs::remove_file(&crdt_path).await.ok();
                }
            }
        }
        Ok(())
    }

    pub async fn delete(&self, id: &NoteId) -> Result<()> {
        let meta_path = self.meta_path(id);
        let crdt_path = self.crdt_path(id);
        if meta_path.exists() {
            fs::remove_file(meta_path).await?;
        }
        if crdt_path.exists() {
            fs::remove_file(crdt_path).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, id: &NoteId) -> bool {
        self.meta_path(id).exists()
    }

    /// Patch only the syntax tag, independent of the debounced CRDT+text
    /// flush. Leaves the `.crdt` file untouched.
    pub async fn update_syntax(&self, id: &NoteId, syntax: &str, updated_at: i64) -> Result<()> {
        let mut note = self.load(id).await?;
        note.syntax = syntax.to_string();
        note.updated_at = updated_at;
        let crdt_state = note.crdt_state.take();
        let json = serde_json::to_string_pretty(&note)?;
        fs::write(self.meta_path(id), json).await.context("writing note metadata")?;
        drop(crdt_state);
        Ok(())
    }

    /// Every currently persisted note id, used by the cleanup cron and by
    /// `count`.
    pub async fn scan_ids(&self) -> Result<Vec<NoteId>> {
        let mut entries = fs::read_dir(self.notes_dir()).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("json")
                && let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str())
            {
                match stem.parse::<NoteId>() {
                    Ok(id) => ids.push(id),
                    Err(_) => warn!("skipping non-note file in notes directory: {stem}"),
                }
            }
        }
        Ok(ids)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.scan_ids().await?.len())
    }

    fn notes_dir(&self) -> PathBuf {
        self.storage.join("notes")
    }
    fn meta_path(&self, id: &NoteId) -> PathBuf {
        self.notes_dir().join(id.as_ref()).with_extension("json")
    }
    fn crdt_path(&self, id: &NoteId) -> PathBuf {
        self.notes_dir().join(id.as_ref()).with_extension("crdt")
    }
}

#[cfg(test)]
impl Drop for Database {
    fn drop(&mut self) {
        // Clean up temporary storage directories on drop.
        if self.storage.parent() == Some(std::env::temp_dir().as_path()) {
            let _ = std::fs::remove_dir_all(&self.storage);
        }
    }
}
