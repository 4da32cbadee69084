//! Periodic cleanup cron: an on-disk sweep over persisted notes, evicting
//! anything expired or stale.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::coordinator::TerminateReason;
use crate::database::Database;
use crate::registry::CoordinatorRegistry;
use crate::time::now_ms;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const STALE_AFTER_MS: i64 = 90 * 24 * 60 * 60 * 1000;

/// Runs until the process exits, deleting rows where `expires_at <= now` or
/// `last_accessed_at <= now - 90 days`, signaling any live coordinator to
/// terminate before the row disappears out from under it.
pub async fn run(db: Arc<Database>, registry: CoordinatorRegistry) {
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        sweep_once(&db, &registry).await;
    }
}

async fn sweep_once(db: &Database, registry: &CoordinatorRegistry) {
    let ids = match db.scan_ids().await {
        Ok(ids) => ids,
        Err(err) => {
            warn!("cleanup sweep failed to list notes: {err:#}");
            return;
        }
    };

    let now = now_ms();
    let mut removed = Vec::new();
    for id in ids {
        let note = match db.load(&id).await {
            Ok(note) => note,
            Err(err) => {
                warn!(note = %id, "cleanup sweep failed to load note: {err:#}");
                continue;
            }
        };

        let expired = note.is_expired(now);
        let stale = now - note.last_accessed_at >= STALE_AFTER_MS;
        if !expired && !stale {
            continue;
        }

        registry.notify_if_live(&id, TerminateReason::Expired);
        if let Err(err) = db.delete(&id).await {
            warn!(note = %id, "cleanup sweep failed to delete note: {err:#}");
            continue;
        }
        removed.push(id);
    }

    if !removed.is_empty() {
        info!(count = removed.len(), "cleanup sweep removed notes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Note;

    #[tokio::test]
    async fn sweep_removes_expired_and_stale_notes() {
        let db = Arc::new(Database::temporary().await.unwrap());
        let registry = CoordinatorRegistry::new(db.clone());
        let now = now_ms();

        let mut expired = Note::new("expired".parse().unwrap(), now - 10_000);
        expired.expires_at = Some(now - 1_000);
        db.store(&expired).await.unwrap();

        let mut stale = Note::new("stale".parse().unwrap(), now - STALE_AFTER_MS - 10_000);
        stale.last_accessed_at = now - STALE_AFTER_MS - 1;
        db.store(&stale).await.unwrap();

        let fresh = Note::new("fresh".parse().unwrap(), now);
        db.store(&fresh).await.unwrap();

        sweep_once(&db, &registry).await;

        assert!(!db.exists(&"expired".parse().unwrap()).await);
        assert!(!db.exists(&"stale".parse().unwrap()).await);
        assert!(db.exists(&"fresh".parse().unwrap()).await);
    }
}
