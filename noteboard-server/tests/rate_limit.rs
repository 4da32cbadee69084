//! Tests the per-session token bucket (C3): burst admits up to `BURST`
//! updates, further updates within the same instant are refused, and enough
//! refusals close the socket.

use std::sync::Arc;

use anyhow::Result;
use common::*;
use noteboard_server::rate_limit::{BURST, DISCONNECT_THRESHOLD};
use noteboard_server::{ServerState, server};
use serde_json::json;

pub mod common;

#[tokio::test]
async fn burst_then_refused_then_disconnected() -> Result<()> {
    logging();
    let app = server(Arc::new(ServerState::temporary().await?));
    let client = TestClient::start(app).await?;

    let created = client.post_json("api/notes", &json!({})).await?;
    let id = created["id"].as_str().unwrap().to_string();

    let mut socket = client.connect(&id, "flooder").await?;
    let _ = socket.recv_type("yjs_sync").await?;

    let update = text_insert_update("x");
    let frame = json!({ "type": "yjs_update", "update": update, "clientId": 1 });

    for _ in 0..(BURST as u64) {
        socket.send(&frame).await;
        socket.recv_type("yjs_ack").await?;
    }

    // The bucket is now empty; further updates are refused but the socket
    // stays open until the violation count crosses the disconnect threshold.
    for _ in 0..(DISCONNECT_THRESHOLD - 1) {
        socket.send(&frame).await;
        let reply = socket.recv_type("error").await?;
        assert_eq!(reply["message"], "rate_limited");
    }

    socket.send(&frame).await;
    socket.recv_closed().await?;

    Ok(())
}
