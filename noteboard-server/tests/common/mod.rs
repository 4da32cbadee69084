use std::net::SocketAddr;

use anyhow::{Result, anyhow};
use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yrs::sync::Awareness;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact};

/// A test WebSocket client that sends and receives JSON frames.
pub struct JsonSocket(WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>);

impl JsonSocket {
    pub async fn send(&mut self, msg: &Value) {
        self.0.send(msg.to_string().into()).await.unwrap();
    }

    pub async fn recv(&mut self) -> Result<Value> {
        let msg = self.0.next().await.ok_or_else(|| anyhow!("WebSocket closed"))??;
        let msg = msg.to_text().map_err(|_| anyhow!("non-string message"))?;
        Ok(serde_json::from_str(msg)?)
    }

    /// Receive frames until one with `"type": want` arrives, discarding any
    /// interleaved broadcast the coordinator also delivered to this socket
    /// (e.g. another session's `editor_count_update`).
    pub async fn recv_type(&mut self, want: &str) -> Result<Value> {
        for _ in 0..64 {
            let msg = self.recv().await?;
            if msg["type"] == want {
                return Ok(msg);
            }
        }
        Err(anyhow!("did not observe a {want} frame in time"))
    }

    pub async fn recv_closed(&mut self) -> Result<()> {
        if let Some(Ok(Message::Close(_))) = self.0.next().await {
            Ok(())
        } else {
            Err(anyhow!("WebSocket should be closed"))
        }
    }
}

pub struct TestClient {
    client: reqwest::Client,
    addr: SocketAddr,
}

impl TestClient {
    pub async fn start(router: axum::Router) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, router.layer(TraceLayer::new_for_http())).into_future());
        let client = reqwest::Client::new();
        Ok(Self { client, addr })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        info!("GET {}", url);
        let resp = self.client.get(&url).send().await?;
        assert_eq!(resp.status(), StatusCode::OK);
        Ok(resp.json().await?)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        info!("POST {}", url);
        let resp = self.client.post(&url).json(body).send().await?;
        assert_eq!(resp.status(), StatusCode::OK);
        Ok(resp.json().await?)
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self.url(path);
        info!("PUT {}", url);
        Ok(self.client.put(&url).json(body).send().await?)
    }

    pub async fn get_status(&self, path: &str) -> Result<StatusCode> {
        let url = self.url(path);
        info!("GET {}", url);
        Ok(self.client.get(&url).send().await?.status())
    }

    pub async fn delete(&self, path: &str) -> Result<StatusCode> {
        let url = self.url(path);
        info!("DELETE {}", url);
        Ok(self.client.delete(&url).send().await?.status())
    }

    pub async fn connect(&self, id: &str, session_id: &str) -> Result<JsonSocket> {
        let url = format!("ws://{}/api/notes/{id}/ws?session_id={session_id}", self.addr);
        let (socket, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
        Ok(JsonSocket(socket))
    }
}

/// A base64-encoded Yjs update that inserts `text` at the start of a fresh
/// document, suitable as the `update` field of a `yjs_update` frame.
pub fn text_insert_update(text: &str) -> String {
    let doc = Doc::new();
    let content = doc.get_or_insert_text("content");
    {
        let mut txn = doc.transact_mut();
        content.insert(&mut txn, 0, text);
    }
    let txn = doc.transact();
    let update = txn.encode_state_as_update_v1(&StateVector::default());
    BASE64.encode(update)
}

/// A base64-encoded awareness update carrying the given local state, suitable
/// as the `update` field of an `awareness_update` frame.
pub fn awareness_update_bytes(local_state_json: &str) -> String {
    let mut awareness = Awareness::new(Doc::new());
    awareness.set_local_state(local_state_json);
    let update = awareness.update().unwrap();
    BASE64.encode(update.encode_v1())
}

/// Decode a `state`/`update` field back into plain text, for assertions
/// against what a client would render.
pub fn decode_text(base64_state: &str) -> String {
    let bytes = BASE64.decode(base64_state).unwrap();
    let update = yrs::Update::decode_v1(&bytes).unwrap();
    let doc = Doc::new();
    let content = doc.get_or_insert_text("content");
    {
        let mut txn = doc.transact_mut();
        txn.apply_update(update).unwrap();
    }
    let txn = doc.transact();
    content.get_string(&txn)
}

pub fn logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug,tower_http=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .try_init()
        .ok();
}
