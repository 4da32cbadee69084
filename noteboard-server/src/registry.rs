//! Coordinator registry (C8): fleet-wide routing to the one live coordinator
//! for a given note, via an entry-or-insert `DashMap`.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tracing::info;

use crate::coordinator::{Coordinator, CoordinatorHandle, CoordinatorMsg, TerminateReason};
use crate::database::Database;
use crate::id::NoteId;
use crate::note::Note;

#[derive(Clone)]
pub struct CoordinatorRegistry {
    inner: Arc<DashMap<NoteId, CoordinatorHandle>>,
    db: Arc<Database>,
}

impl CoordinatorRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { inner: Arc::new(DashMap::new()), db }
    }

    /// Return the live coordinator for `id`, spinning one up from durable
    /// storage on first use. A second concurrent caller for the same id
    /// gets the same handle, never a second writer.
    pub async fn route(&self, id: &NoteId) -> Result<CoordinatorHandle> {
        if let Some(handle) = self.inner.get(id)
            && !handle.is_closed()
        {
            return Ok(handle.clone());
        }

        let note = self.db.load(id).await.context("loading note for coordinator startup")?;
        let handle = self.spawn_locked(note);
        Ok(handle)
    }

    /// Start a coordinator for a note that was just created, so the very
    /// first WebSocket upgrade doesn't race a fresh `load` against the file
    /// `store` that created it.
    pub fn spawn_for_new_note(&self, note: Note) -> CoordinatorHandle {
        self.spawn_locked(note)
    }

    fn spawn_locked(&self, note: Note) -> CoordinatorHandle {
        let id = note.id.clone();
        match self.inner.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) if !occupied.get().is_closed() => {
                occupied.get().clone()
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                info!(note = %id, "replacing dead coordinator");
                let handle = Coordinator::spawn(note, self.db.clone(), self.clone());
                occupied.insert(handle.clone());
                handle
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let handle = Coordinator::spawn(note, self.db.clone(), self.clone());
                vacant.insert(handle.clone());
                handle
            }
        }
    }

    /// Called by a coordinator as the last step of its own shutdown.
    pub fn deregister(&self, id: &NoteId) {
        self.inner.remove(id);
    }

    /// Tell a note's coordinator to terminate, if one is currently live.
    /// Never spins one up just to kill it.
    pub fn notify_if_live(&self, id: &NoteId, reason: TerminateReason) {
        if let Some(handle) = self.inner.get(id) {
            handle.send(CoordinatorMsg::Terminate { reason });
        }
    }

    /// Every currently live coordinator handle, for graceful-shutdown flush.
    pub fn all_handles(&self) -> Vec<CoordinatorHandle> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }
}
