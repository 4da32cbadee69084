//! Tests that a note's CRDT state survives a client disconnecting and
//! reconnecting: the coordinator stays alive holding the replica, and a new
//! connection's initial `yjs_sync` reflects every edit applied so far.

use std::sync::Arc;

use anyhow::Result;
use common::*;
use noteboard_server::{ServerState, server};
use serde_json::json;

pub mod common;

#[tokio::test]
async fn reconnecting_client_receives_full_state() -> Result<()> {
    logging();
    let app = server(Arc::new(ServerState::temporary().await?));
    let client = TestClient::start(app).await?;

    let created = client.post_json("api/notes", &json!({})).await?;
    let id = created["id"].as_str().unwrap().to_string();

    let mut first = client.connect(&id, "alice").await?;
    let _ = first.recv_type("yjs_sync").await?;

    let update = text_insert_update("hello");
    first.send(&json!({ "type": "yjs_update", "update": update, "clientId": 1 })).await;
    first.recv_type("yjs_ack").await?;

    drop(first);

    // Reconnecting under a different browser session still finds the
    // coordinator live with the edit already applied.
    let mut second = client.connect(&id, "alice-again").await?;
    let sync = second.recv_type("yjs_sync").await?;
    let state = sync["state"].as_str().unwrap();
    assert_eq!(decode_text(state), "hello");

    Ok(())
}
