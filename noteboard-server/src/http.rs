//! HTTP control plane: create/read/update/delete a note row, the
//! custom-id availability probe, and WebSocket upgrade routing. Everything
//! here is the "external collaborator" the coordinator sits behind — no
//! CRDT or session logic lives in this module beyond routing to C8.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ServerState;
use crate::coordinator::{CoordinatorHandle, CoordinatorMsg, TerminateReason};
use crate::error::{AppError, ErrorKind};
use crate::frame::{ClientFrame, ServerFrame};
use crate::id::NoteId;
use crate::note::{Note, SYNTAX_ALLOW_LIST};
use crate::time::now_ms;

pub fn routes() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/notes", axum::routing::post(create_note))
        .route("/notes/{id}", get(get_note).put(update_note).delete(delete_note))
        .route("/notes/{id}/ws", get(ws_upgrade))
        .route("/check/{id}", get(check_note))
}

#[derive(Serialize)]
struct NoteView {
    id: NoteId,
    content: String,
    syntax: String,
    is_encrypted: bool,
    view_count: u64,
    max_views: Option<u64>,
    expires_at: Option<i64>,
    last_accessed_at: i64,
    version: u64,
    created_at: i64,
    updated_at: i64,
    last_editor_session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_last_view: Option<bool>,
}

impl From<&Note> for NoteView {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            content: note.content.clone(),
            syntax: note.syntax.clone(),
            is_encrypted: note.is_encrypted,
            view_count: note.view_count,
            max_views: note.max_views,
            expires_at: note.expires_at,
            last_accessed_at: note.last_accessed_at,
            version: note.version,
            created_at: note.created_at,
            updated_at: note.updated_at,
            last_editor_session: note.last_editor_session.clone(),
            is_last_view: None,
        }
    }
}

/// `GET /api/notes/:id` — returns the note, incrementing `view_count` and
/// deleting it if this was the last permitted view.
async fn get_note(State(state): State<Arc<ServerState>>, Path(id): Path<NoteId>) -> Result<Json<NoteView>, AppError> {
    let mut note = state.db.load(&id).await.map_err(|_| anyhow::Error::new(ErrorKind::NotFound))?;
    let now = now_ms();

    if note.is_expired(now) {
        state.db.delete(&id).await?;
        state.registry.notify_if_live(&id, TerminateReason::Expired);
        return Err(anyhow::Error::new(ErrorKind::NotFound).into());
    }

    let is_last_view = note.record_view(now);
    state.db.store(&note).await?;

    let mut view = NoteView::from(&note);
    view.is_last_view = Some(is_last_view);

    if is_last_view {
        state.db.delete(&id).await?;
        state.registry.notify_if_live(&id, TerminateReason::ViewBudgetExhausted);
    }

    Ok(Json(view))
}

#[derive(Deserialize, Default)]
struct CreateNoteRequest {
    id: Option<String>,
    syntax: Option<String>,
    is_encrypted: Option<bool>,
    max_views: Option<u64>,
    expires_at: Option<i64>,
}

#[derive(Serialize)]
struct CreateNoteResponse {
    id: NoteId,
    version: u64,
}

/// `POST /api/notes` — creates a note with an auto-generated or caller-chosen id.
async fn create_note(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<CreateNoteResponse>, AppError> {
    let id = match req.id {
        Some(custom) => {
            let parsed: NoteId = custom.parse()?;
            if state.db.exists(&parsed).await {
                return Err(anyhow::Error::new(ErrorKind::InvalidFrame).into());
            }
            parsed
        }
        None => {
            let mut candidate = NoteId::generate(crate::id::DEFAULT_LEN);
            for len in crate::id::DEFAULT_LEN..=crate::id::MAX_LEN {
                candidate = NoteId::generate(len);
                if !state.db.exists(&candidate).await {
                    break;
                }
            }
            candidate
        }
    };

    let now = now_ms();
    let mut note = Note::new(id.clone(), now);
    if let Some(syntax) = req.syntax {
        if !SYNTAX_ALLOW_LIST.contains(&syntax.as_str()) {
            return Err(anyhow::Error::new(ErrorKind::InvalidSyntax).into());
        }
        note.syntax = syntax;
    }
    note.is_encrypted = req.is_encrypted.unwrap_or(false);
    note.max_views = req.max_views;
    note.expires_at = req.expires_at;
    note.check_invariants()?;

    state.db.store(&note).await?;
    state.registry.spawn_for_new_note(note.clone());

    info!(note = %id, "created note");
    Ok(Json(CreateNoteResponse { id, version: note.version }))
}

#[derive(Deserialize, Default)]
struct UpdateNoteRequest {
    content: Option<String>,
    syntax: Option<String>,
    max_views: Option<u64>,
    expires_at: Option<i64>,
    expected_version: Option<u64>,
}

/// `PUT /api/notes/:id` — optimistic-concurrency update, skipped for
/// encrypted notes. Setting `max_views` resets `view_count`.
async fn update_note(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<NoteId>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<NoteView>, AppError> {
    let mut note = state.db.load(&id).await.map_err(|_| anyhow::Error::new(ErrorKind::NotFound))?;

    if !note.is_encrypted
        && let Some(expected) = req.expected_version
        && expected != note.version
    {
        return Err(anyhow::Error::new(ErrorKind::VersionConflict).into());
    }

    if let Some(content) = req.content {
        note.content = content;
    }
    if let Some(syntax) = req.syntax {
        if !SYNTAX_ALLOW_LIST.contains(&syntax.as_str()) {
            return Err(anyhow::Error::new(ErrorKind::InvalidSyntax).into());
        }
        note.syntax = syntax;
    }
    if let Some(max_views) = req.max_views {
        note.max_views = Some(max_views);
        note.view_count = 0;
    }
    if let Some(expires_at) = req.expires_at {
        note.expires_at = Some(expires_at);
    }
    note.version += 1;
    note.updated_at = now_ms();
    note.check_invariants()?;

    state.db.store(&note).await?;
    Ok(Json(NoteView::from(&note)))
}

/// `DELETE /api/notes/:id` — deletes the row and signals a live coordinator
/// to terminate.
async fn delete_note(State(state): State<Arc<ServerState>>, Path(id): Path<NoteId>) -> Result<StatusCode, AppError> {
    state.db.delete(&id).await?;
    state.registry.notify_if_live(&id, TerminateReason::Deleted);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct CheckResponse {
    available: bool,
}

/// `GET /api/check/:id` — availability probe for a custom id.
async fn check_note(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> Result<Json<CheckResponse>, AppError> {
    let parsed: NoteId = id.parse().map_err(|_| anyhow::Error::new(ErrorKind::InvalidFrame))?;
    Ok(Json(CheckResponse { available: !state.db.exists(&parsed).await }))
}

#[derive(Deserialize)]
struct WsParams {
    session_id: String,
}

/// `GET /api/notes/:id/ws?session_id=...` — upgrades to the coordinator's
/// WebSocket protocol.
async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<NoteId>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.registry.route(&id).await.map_err(|_| anyhow::Error::new(ErrorKind::NotFound))?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle, params.session_id)))
}

async fn handle_socket(socket: WebSocket, handle: CoordinatorHandle, browser_session_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let Some(session_id) = handle.connect(browser_session_id, tx.clone()).await else {
        writer.abort();
        return;
    };

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle.send(CoordinatorMsg::Frame { session_id: session_id.clone(), frame }),
                Err(err) => {
                    warn!("dropping malformed frame: {err}");
                    let _ = tx.send(ServerFrame::Error { message: "invalid_frame".into() }.to_message());
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle.send(CoordinatorMsg::Disconnect { session_id });
    writer.abort();
}
