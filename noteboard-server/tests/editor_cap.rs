//! Tests the active-editor cap: once `ACTIVE_EDITOR_LIMIT` sessions are
//! editing, the next viewer that tries to apply an update is turned away
//! with `editor_limit_reached`, without affecting anyone already editing.

use std::sync::Arc;

use anyhow::Result;
use common::*;
use noteboard_server::session::ACTIVE_EDITOR_LIMIT;
use noteboard_server::{ServerState, server};
use serde_json::json;

pub mod common;

#[tokio::test]
async fn eleventh_editor_is_refused() -> Result<()> {
    logging();
    let app = server(Arc::new(ServerState::temporary().await?));
    let client = TestClient::start(app).await?;

    let created = client.post_json("api/notes", &json!({})).await?;
    let id = created["id"].as_str().unwrap().to_string();

    let mut sockets = Vec::new();
    for i in 0..=ACTIVE_EDITOR_LIMIT {
        let mut socket = client.connect(&id, &format!("editor-{i}")).await?;
        let _ = socket.recv_type("yjs_sync").await?;
        sockets.push(socket);
    }

    // The first ACTIVE_EDITOR_LIMIT sockets each apply an update and become
    // active editors.
    for socket in sockets.iter_mut().take(ACTIVE_EDITOR_LIMIT) {
        let update = text_insert_update("a");
        socket.send(&json!({ "type": "yjs_update", "update": update, "clientId": 1 })).await;
        socket.recv_type("yjs_ack").await?;
    }

    // The one-too-many viewer is refused, and does not bump the count.
    let last = sockets.last_mut().unwrap();
    let update = text_insert_update("b");
    last.send(&json!({ "type": "yjs_update", "update": update, "clientId": 2 })).await;
    let reply = last.recv_type("error").await?;
    assert_eq!(reply["message"], "editor_limit_reached");

    Ok(())
}
