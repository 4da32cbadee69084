//! Tests the awareness relay (C2): presence deltas are relayed to every
//! other session verbatim and are never sequenced or persisted, unlike
//! `yjs_update`.

use std::sync::Arc;

use anyhow::Result;
use common::*;
use noteboard_server::id::NoteId;
use noteboard_server::{ServerState, server};
use serde_json::json;

pub mod common;

#[tokio::test]
async fn awareness_update_is_relayed_but_not_persisted() -> Result<()> {
    logging();
    let state = Arc::new(ServerState::temporary().await?);
    let client = TestClient::start(server(state.clone())).await?;

    let created = client.post_json("api/notes", &json!({})).await?;
    let id: NoteId = created["id"].as_str().unwrap().parse()?;

    let mut alice = client.connect(id.as_ref(), "alice").await?;
    let _ = alice.recv_type("yjs_sync").await?;
    let mut bob = client.connect(id.as_ref(), "bob").await?;
    let _ = bob.recv_type("yjs_sync").await?;
    let _ = alice.recv_type("user_joined").await?;

    let presence = awareness_update_bytes(r#"{"name":"alice","cursor":5}"#);
    alice.send(&json!({ "type": "awareness_update", "update": presence, "clientId": 7 })).await;

    let relayed = bob.recv_type("awareness_update").await?;
    assert_eq!(relayed["update"], presence);
    // Relayed with the server-assigned session id, never the client-chosen
    // awareness integer.
    assert_ne!(relayed["clientId"], 7);

    // Awareness is ephemeral: it never touches the persisted note, and the
    // wire frame carries no seq/seqNum the way yjs_update and syntax_change do.
    assert!(relayed.get("seq").is_none());
    assert!(relayed.get("seqNum").is_none());

    let persisted = state.db.load(&id).await?;
    assert_eq!(persisted.content, "");

    Ok(())
}
