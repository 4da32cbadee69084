//! Note Session Coordinator (C7): the single-threaded authority for one
//! note. A mailbox/actor in place of a locked shared state struct — every
//! mutation happens inside [`Coordinator::run`]; everyone else talks to it
//! through [`CoordinatorHandle`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::awareness::AwarenessRegistry;
use crate::crdt::CrdtReplica;
use crate::database::Database;
use crate::frame::{B64Bytes, ClientFrame, ServerFrame};
use crate::id::NoteId;
use crate::note::{Note, SYNTAX_ALLOW_LIST};
use crate::persistence::{FlushDecision, PersistenceScheduler};
use crate::rate_limit::Charge;
use crate::registry::CoordinatorRegistry;
use crate::sequencer::Sequencer;
use crate::session::{ACTIVE_EDITOR_LIMIT, ClientSession, SessionId, SessionTable};
use crate::time::now_ms;

/// How often the persistence/idle-teardown timer ticks. Coarser than
/// [`crate::persistence::IDLE_DEBOUNCE_MS`] would demand on its own, fine
/// grained enough not to delay a debounced flush noticeably.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How long a coordinator with zero connected sessions stays alive before
/// tearing itself down. Realizes the registry's "spin up on first use, tear
/// down on idle" contract.
const IDLE_TEARDOWN_MS: i64 = 10 * 60 * 1000;

/// Why a coordinator is shutting down, and therefore what it broadcasts on
/// the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    Deleted,
    Expired,
    ViewBudgetExhausted,
    /// No sessions connected for longer than [`IDLE_TEARDOWN_MS`]. Not part
    /// of the wire protocol; nothing is broadcast.
    Idle,
}

/// Messages accepted by a coordinator's mailbox. Every variant is handled to
/// completion before the next is taken off the queue.
pub enum CoordinatorMsg {
    Connect { browser_session_id: String, sender: mpsc::UnboundedSender<Message>, reply: oneshot::Sender<SessionId> },
    Frame { session_id: SessionId, frame: ClientFrame },
    Disconnect { session_id: SessionId },
    Terminate { reason: TerminateReason },
    /// Flush pending persistence regardless of debounce state and
    /// acknowledge when done. Used by graceful shutdown.
    FlushNow { done: oneshot::Sender<()> },
}

/// A cheap, cloneable reference to a running coordinator's mailbox.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::UnboundedSender<CoordinatorMsg>,
}

impl CoordinatorHandle {
    pub fn send(&self, msg: CoordinatorMsg) {
        let _ = self.sender.send(msg);
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn connect(&self, browser_session_id: String, sender: mpsc::UnboundedSender<Message>) -> Option<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorMsg::Connect { browser_session_id, sender, reply });
        rx.await.ok()
    }

    /// Force an immediate flush and wait for it to complete, used when the
    /// server is shutting down and wants every note's pending edits on
    /// disk before the process exits.
    pub async fn flush_and_wait(&self) {
        let (done, rx) = oneshot::channel();
        self.send(CoordinatorMsg::FlushNow { done });
        let _ = rx.await;
    }
}

pub struct Coordinator {
    note_id: NoteId,
    note: Note,
    replica: CrdtReplica,
    awareness: AwarenessRegistry,
    sequencer: Sequencer,
    sessions: SessionTable,
    persistence: PersistenceScheduler,
    db: Arc<Database>,
    registry: CoordinatorRegistry,
    mailbox: mpsc::UnboundedReceiver<CoordinatorMsg>,
    next_session_id: u64,
    idle_since: Option<i64>,
}

impl Coordinator {
    pub fn spawn(note: Note, db: Arc<Database>, registry: CoordinatorRegistry) -> CoordinatorHandle {
        let (sender, mailbox) = mpsc::unbounded_channel();
        let replica = match CrdtReplica::from_state(note.crdt_state.as_deref().unwrap_or(&[])) {
            Ok(replica) => replica,
            Err(err) => {
                warn!(note = %note.id, "discarding unreadable crdt state: {err:#}");
                CrdtReplica::new()
            }
        };
        let note_id = note.id.clone();
        let coordinator = Self {
            note_id: note_id.clone(),
            note,
            replica,
            awareness: AwarenessRegistry::new(),
            sequencer: Sequencer::new(),
            sessions: SessionTable::new(),
            persistence: PersistenceScheduler::new(),
            db,
            registry,
            mailbox,
            next_session_id: 1,
            idle_since: Some(now_ms()),
        };
        tokio::spawn(coordinator.run());
        CoordinatorHandle { sender }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                biased;
                msg = self.mailbox.recv() => {
                    match msg {
                        Some(msg) => {
                            if self.handle(msg).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
            }
        }
        debug!(note = %self.note_id, "coordinator loop exited");
    }

    /// Returns true if the coordinator should stop running.
    async fn handle(&mut self, msg: CoordinatorMsg) -> bool {
        match msg {
            CoordinatorMsg::Connect { browser_session_id, sender, reply } => {
                self.handle_connect(browser_session_id, sender, reply).await;
                false
            }
            CoordinatorMsg::Frame { session_id, frame } => {
                self.handle_frame(session_id, frame).await;
                false
            }
            CoordinatorMsg::Disconnect { session_id } => {
                self.handle_disconnect(session_id).await;
                false
            }
            CoordinatorMsg::Terminate { reason } => {
                self.terminate(reason).await;
                true
            }
            CoordinatorMsg::FlushNow { done } => {
                if self.persistence.has_pending() {
                    self.flush_persistence().await;
                }
                let _ = done.send(());
                false
            }
        }
    }

    async fn handle_connect(
        &mut self,
        browser_session_id: String,
        sender: mpsc::UnboundedSender<Message>,
        reply: oneshot::Sender<SessionId>,
    ) {
        let now = now_ms();
        let session_id = SessionId::new(self.next_session_id);
        self.next_session_id += 1;
        self.idle_since = None;

        let session = ClientSession::new(sender, browser_session_id, now);
        session.send(
            ServerFrame::YjsSync {
                state: B64Bytes(self.replica.full_state()),
                seq: self.sequencer.current(),
                client_id: session_id.clone(),
                syntax: Some(self.note.syntax.clone()),
            }
            .to_message(),
        );
        match self.awareness.full_snapshot() {
            Ok(Some(snapshot)) => session.send(
                ServerFrame::AwarenessUpdate { update: B64Bytes(snapshot), client_id: session_id.clone() }
                    .to_message(),
            ),
            Ok(None) => {}
            Err(err) => debug!(note = %self.note_id, "failed to encode awareness snapshot for new join: {err:#}"),
        }
        self.sessions.insert(session_id.clone(), session);
        let _ = reply.send(session_id.clone());

        let seq_num = self.sequencer.next();
        self.sessions.broadcast_all(
            ServerFrame::UserJoined {
                client_id: session_id.clone(),
                connected_users: self.sessions.connected_ids(),
                active_editor_count: self.sessions.active_editors(now),
                viewer_count: self.sessions.viewers(now),
                seq_num,
            }
            .to_message(),
        );
    }

    async fn handle_frame(&mut self, session_id: SessionId, frame: ClientFrame) {
        let Some(session) = self.sessions.get(&session_id) else {
            // Disconnected in the race between the read loop and this
            // mailbox message; nothing to do.
            return;
        };
        if !session.authenticated {
            session.send(ServerFrame::Error { message: "unauthorized".into() }.to_message());
            return;
        }

        match frame {
            ClientFrame::YjsUpdate { update, .. } => self.handle_yjs_update(session_id, update).await,
            ClientFrame::AwarenessUpdate { update, client_id } => self.handle_awareness_update(session_id, update, client_id),
            ClientFrame::YjsStateRequest { .. } => self.handle_state_request(&session_id),
            ClientFrame::SyntaxChange { syntax } => self.handle_syntax_change(session_id, syntax).await,
            ClientFrame::RequestEdit {} => self.handle_request_edit(&session_id),
        }
    }

    async fn handle_yjs_update(&mut self, session_id: SessionId, update: B64Bytes) {
        let now = now_ms();

        let charge = {
            let Some(session) = self.sessions.get_mut(&session_id) else { return };
            session.rate_limit.charge(now)
        };
        match charge {
            Charge::Disconnect => {
                self.close_session(&session_id, 1008, "rate limit exceeded").await;
                return;
            }
            Charge::Refused => {
                if let Some(session) = self.sessions.get(&session_id) {
                    session.send(ServerFrame::Error { message: "rate_limited".into() }.to_message());
                }
                return;
            }
            Charge::Admitted => {}
        }

        let was_active_editor = self.sessions.get(&session_id).is_some_and(|s| s.is_active_editor(now));
        if !was_active_editor && self.sessions.active_editors(now) >= ACTIVE_EDITOR_LIMIT {
            if let Some(session) = self.sessions.get(&session_id) {
                session.send(ServerFrame::Error { message: "editor_limit_reached".into() }.to_message());
            }
            return;
        }

        // Encrypted notes carry ciphertext the server cannot decode as a
        // yrs update; relay it untouched rather than feeding it to the
        // replica, which would reject it as malformed.
        let decision = if self.note.is_encrypted {
            FlushDecision::Wait
        } else {
            if let Err(err) = self.replica.apply(&update.0) {
                debug!(note = %self.note_id, "rejecting malformed crdt update: {err:#}");
                if let Some(session) = self.sessions.get(&session_id) {
                    session.send(ServerFrame::Error { message: "invalid_frame".into() }.to_message());
                }
                return;
            }

            let decision = self.persistence.record_update(now);
            if let Some(session) = self.sessions.get_mut(&session_id) {
                session.last_edit_at = Some(now);
            }
            if let Some(session) = self.sessions.get(&session_id) {
                self.note.last_editor_session = Some(session.browser_session_id.clone());
            }
            decision
        };

        let seq = self.sequencer.next();
        self.sessions.broadcast_except(
            &session_id,
            ServerFrame::YjsUpdate { update: update.clone(), client_id: session_id.clone(), seq }.to_message(),
        );
        if let Some(session) = self.sessions.get(&session_id) {
            session.send(ServerFrame::YjsAck { seq_num: seq }.to_message());
        }

        if !was_active_editor {
            let seq_num = self.sequencer.next();
            self.sessions.broadcast_all(
                ServerFrame::EditorCountUpdate {
                    active_editor_count: self.sessions.active_editors(now),
                    viewer_count: self.sessions.viewers(now),
                    seq_num,
                }
                .to_message(),
            );
        }

        if decision == FlushDecision::FlushNow {
            self.flush_persistence().await;
        }
    }

    fn handle_awareness_update(&mut self, session_id: SessionId, update: B64Bytes, client_id: u32) {
        let _ = client_id;
        self.awareness.apply(&update.0);
        self.sessions.broadcast_except(
            &session_id,
            ServerFrame::AwarenessUpdate { update, client_id: session_id.clone() }.to_message(),
        );
    }

    fn handle_state_request(&self, session_id: &SessionId) {
        if let Some(session) = self.sessions.get(session_id) {
            session.send(ServerFrame::YjsStateResponse { state: B64Bytes(self.replica.full_state()) }.to_message());
        }
    }

    async fn handle_syntax_change(&mut self, session_id: SessionId, syntax: String) {
        if !SYNTAX_ALLOW_LIST.contains(&syntax.as_str()) {
            if let Some(session) = self.sessions.get(&session_id) {
                session.send(ServerFrame::Error { message: "invalid_syntax".into() }.to_message());
            }
            return;
        }

        self.note.syntax = syntax.clone();
        let seq = self.sequencer.next();
        self.sessions.broadcast_except(
            &session_id,
            ServerFrame::SyntaxChange { syntax: syntax.clone(), client_id: session_id.clone(), seq_num: seq }.to_message(),
        );
        if let Some(session) = self.sessions.get(&session_id) {
            session.send(ServerFrame::SyntaxAck { seq_num: seq }.to_message());
        }

        let now = now_ms();
        // Persisted independently of the debounced CRDT+text flush. A
        // failure here is logged and the in-memory `syntax` is kept as-is
        // (not rolled back) rather than desynchronizing it from what every
        // connected client just received.
        if let Err(err) = self.db.update_syntax(&self.note_id, &syntax, now).await {
            warn!(note = %self.note_id, "syntax persist failed: {err:#}");
        }
    }

    fn handle_request_edit(&self, session_id: &SessionId) {
        let now = now_ms();
        let Some(session) = self.sessions.get(session_id) else { return };
        let was_active_editor = session.is_active_editor(now);
        let active_editors = self.sessions.active_editors(now);
        let can_edit = was_active_editor || active_editors < ACTIVE_EDITOR_LIMIT;
        session.send(
            ServerFrame::RequestEditResponse {
                can_edit,
                active_editor_count: active_editors,
                viewer_count: self.sessions.viewers(now),
            }
            .to_message(),
        );
    }

    async fn handle_disconnect(&mut self, session_id: SessionId) {
        let now = now_ms();
        let Some(removed) = self.sessions.remove(&session_id) else { return };

        if removed.is_active_editor(now) {
            let seq_num = self.sequencer.next();
            self.sessions.broadcast_all(
                ServerFrame::EditorCountUpdate {
                    active_editor_count: self.sessions.active_editors(now),
                    viewer_count: self.sessions.viewers(now),
                    seq_num,
                }
                .to_message(),
            );
        }

        let seq_num = self.sequencer.next();
        self.sessions.broadcast_all(
            ServerFrame::UserLeft {
                client_id: session_id,
                connected_users: self.sessions.connected_ids(),
                active_editor_count: self.sessions.active_editors(now),
                viewer_count: self.sessions.viewers(now),
                seq_num,
            }
            .to_message(),
        );

        if self.sessions.is_empty() {
            self.idle_since = Some(now);
        }
    }

    async fn close_session(&mut self, session_id: &SessionId, code: u16, reason: &'static str) {
        if let Some(session) = self.sessions.get(session_id) {
            session.send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code,
                reason: reason.into(),
            })));
        }
        self.handle_disconnect(session_id.clone()).await;
    }

    async fn on_tick(&mut self) {
        let now = now_ms();
        if self.persistence.idle_flush_due(now) {
            self.flush_persistence().await;
        }
        if self.note.is_expired(now) {
            self.terminate(TerminateReason::Expired).await;
            return;
        }
        if let Some(idle_since) = self.idle_since
            && self.sessions.is_empty()
            && now - idle_since >= IDLE_TEARDOWN_MS
        {
            self.terminate(TerminateReason::Idle).await;
        }
    }

    async fn flush_persistence(&mut self) {
        let now = now_ms();
        if !self.note.is_encrypted {
            self.note.content = self.replica.text();
            self.note.crdt_state = Some(self.replica.full_state());
        }
        self.note.version += 1;
        self.note.updated_at = now;

        match self.db.store(&self.note).await {
            Ok(()) => self.persistence.mark_flushed(),
            Err(err) => warn!(note = %self.note_id, "persistence flush failed, will retry: {err:#}"),
        }
    }

    async fn terminate(&mut self, reason: TerminateReason) {
        if self.persistence.has_pending() {
            self.flush_persistence().await;
        }

        match reason {
            TerminateReason::Deleted => {
                self.sessions.broadcast_all(
                    ServerFrame::NoteDeleted { session_id: self.note.last_editor_session.clone() }.to_message(),
                );
            }
            TerminateReason::Expired => {
                self.sessions.broadcast_all(ServerFrame::NoteExpired {}.to_message());
            }
            TerminateReason::ViewBudgetExhausted => {
                self.sessions.broadcast_all(ServerFrame::NoteDeleted { session_id: None }.to_message());
            }
            TerminateReason::Idle => {}
        }

        for (_, session) in self.sessions.iter() {
            session.send(Message::Close(None));
        }
        self.awareness.clear();
        self.registry.deregister(&self.note_id);
        info!(note = %self.note_id, ?reason, "coordinator terminated");
    }
}
