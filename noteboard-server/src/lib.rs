//! Server backend for the note session coordinator.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;

pub mod awareness;
pub mod cleanup;
pub mod coordinator;
pub mod crdt;
pub mod database;
pub mod error;
pub mod frame;
mod http;
pub mod id;
pub mod note;
pub mod persistence;
pub mod rate_limit;
pub mod registry;
pub mod sequencer;
pub mod session;
pub mod time;

use database::Database;
use registry::CoordinatorRegistry;

/// Shared state reachable from every HTTP and WebSocket handler.
pub struct ServerState {
    pub registry: CoordinatorRegistry,
    pub db: Arc<Database>,
}

impl ServerState {
    pub async fn new(storage: PathBuf) -> anyhow::Result<Self> {
        let db = Arc::new(Database::new(storage).await?);
        let registry = CoordinatorRegistry::new(db.clone());
        tokio::spawn(cleanup::run(db.clone(), registry.clone()));
        Ok(Self { registry, db })
    }

    /// Construct state backed by a temporary directory, for tests.
    pub async fn temporary() -> anyhow::Result<Self> {
        let db = Arc::new(Database::temporary().await?);
        let registry = CoordinatorRegistry::new(db.clone());
        Ok(Self { registry, db })
    }

    /// Flush every live coordinator's pending persistence. Called on
    /// graceful shutdown so in-flight edits aren't lost.
    pub async fn persist(&self) {
        let handles = self.registry.all_handles();
        futures::future::join_all(handles.iter().map(|h| h.flush_and_wait())).await;
    }
}

/// A combined router handling all server routes under `/api`.
pub fn server(state: Arc<ServerState>) -> Router {
    Router::new().nest("/api", http::routes()).with_state(state)
}
