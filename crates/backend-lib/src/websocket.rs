// ============================
// crates/backend-lib/src/websocket.rs
// ============================
//! Per-connection event handling.
//!
//! An [`EventHandler`] is instantiated per WebSocket connection once the
//! handshake has resolved an identity. It owns that connection's view of the
//! world: the authenticated identity, the opaque connection id, and the
//! outbound channel. Room membership checks, message fan-out and the
//! thread/answer transitions all run through here against the shared
//! [`AppState`].
//!
//! Failure semantics: errors are unicast to this connection only, never
//! broadcast; once a message is durably created, a failed delivery to some
//! subscriber neither rolls back the write nor blocks the rest.

use crate::error::AppError;
use crate::metrics as keys;
use crate::storage::{with_timeout, MessagePatch, Store, ThreadPatch, ThreadRecord};
use crate::validation;
use crate::AppState;
use metrics::counter;
use spaceqa_common::{ClientEvent, Identity, ServerEvent, ThreadStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct EventHandler<S> {
    state: Arc<AppState<S>>,
    conn_id: String,
    identity: Identity,
    outbound: mpsc::Sender<ServerEvent>,
}

impl<S: Store> EventHandler<S> {
    pub fn new(
        state: Arc<AppState<S>>,
        identity: Identity,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            state,
            conn_id: Uuid::new_v4().to_string(),
            identity,
            outbound,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn store_deadline(&self) -> Duration {
        self.state.settings.limits.store_timeout()
    }

    /// Unicast to this connection. A send failure means the connection is
    /// going away; the read loop will notice on its own.
    async fn send(&self, event: ServerEvent) {
        if self.outbound.send(event).await.is_err() {
            debug!(conn_id = %self.conn_id, "outbound channel closed");
        }
    }

    /// Route one inbound event. Business errors become a unicast `error`
    /// event; infrastructure errors are additionally logged.
    pub async fn dispatch(&self, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(&room_id).await,
            ClientEvent::SubmitMessage {
                room_id,
                thread_id,
                content,
                is_answer,
            } => {
                self.submit_message(&room_id, thread_id.as_deref(), &content, is_answer)
                    .await
            },
            ClientEvent::AcceptAnswer { message_id } => self.accept_answer(&message_id).await,
            ClientEvent::CloseThread { thread_id } => self.close_thread(&thread_id).await,
        };

        if let Err(err) = result {
            if matches!(
                err,
                AppError::Store(_)
                    | AppError::StoreUnavailable
                    | AppError::Internal(_)
                    | AppError::Json(_)
            ) {
                error!(conn_id = %self.conn_id, error = %err, "event handling failed");
            }
            self.send(err.to_event()).await;
        }
    }

    /// Join this connection to a room's subscriber set.
    ///
    /// Permitted iff the identity owns the room or holds any membership
    /// record. Join is silent to the rest of the room; re-joining just
    /// re-sends the acknowledgment.
    async fn join_room(&self, room_id: &str) -> Result<(), AppError> {
        let room = with_timeout(
            self.store_deadline(),
            self.state.store.find_room(room_id, &self.identity.id),
        )
        .await?
        .ok_or(AppError::RoomNotFound)?;

        let permitted = room.owner_id == self.identity.id || room.is_member;
        if !permitted {
            return Err(AppError::AccessDenied);
        }

        let newly_joined =
            self.state
                .registry
                .join(room_id, &self.conn_id, self.outbound.clone());
        if newly_joined {
            counter!(keys::ROOM_JOINED).increment(1);
            info!(conn_id = %self.conn_id, room_id, user = %self.identity.email, "joined room");
        }

        self.send(ServerEvent::JoinedRoom {
            room_id: room.id,
            room_name: room.name,
        })
        .await;
        Ok(())
    }

    /// Persist a message and fan it out to the room.
    ///
    /// Joining first is not required: the message is scoped to the room id
    /// the caller supplies, and only subscribers of that room see the
    /// broadcast. The stored `is_answer` is the caller's flag verbatim;
    /// authorization happens at acceptance, not at claim time.
    async fn submit_message(
        &self,
        room_id: &str,
        thread_id: Option<&str>,
        content: &str,
        is_answer: bool,
    ) -> Result<(), AppError> {
        let content = validation::normalize_content(content)?;
        let deadline = self.store_deadline();

        let (thread, is_new_thread) = match thread_id {
            None => {
                let title = validation::derive_title(&content);
                let thread = with_timeout(
                    deadline,
                    self.state.store.create_thread(room_id, &self.identity, &title),
                )
                .await?;
                (thread, true)
            },
            Some(id) => {
                let thread = with_timeout(deadline, self.state.store.find_thread(id))
                    .await?
                    .ok_or(AppError::ThreadNotFound)?;
                if thread.status == ThreadStatus::Closed {
                    return Err(AppError::ThreadClosed);
                }
                (thread, false)
            },
        };

        let message = with_timeout(
            deadline,
            self.state
                .store
                .create_message(&thread.id, &self.identity, &content, is_answer),
        )
        .await?;

        // Message create and recency bump are two independent writes; a
        // failed bump only degrades thread ordering, so the submit still
        // commits.
        if !is_new_thread {
            let bump = ThreadPatch {
                touched_at: Some(message.created_at),
                ..Default::default()
            };
            if let Err(err) = with_timeout(
                deadline,
                self.state.store.update_thread(&thread.id, bump),
            )
            .await
            {
                warn!(thread_id = %thread.id, error = %err, "failed to bump thread recency");
            }
        }

        self.broadcast_new_message(room_id, &thread, message).await;
        Ok(())
    }

    async fn broadcast_new_message(
        &self,
        room_id: &str,
        thread: &ThreadRecord,
        message: spaceqa_common::MessageRecord,
    ) {
        let event = ServerEvent::NewMessage {
            thread: thread.summary(),
            message,
        };
        let delivered = self.state.registry.broadcast(room_id, event).await;
        counter!(keys::MESSAGE_BROADCAST).increment(1);
        debug!(
            conn_id = %self.conn_id,
            room_id,
            thread_id = %thread.id,
            delivered,
            "message fanned out"
        );
    }

    /// Ratify a claimed answer: `claimed-answer → accepted-answer`.
    ///
    /// Only the owner of the room the message's thread belongs to may
    /// accept, and only messages claimed as answers are eligible.
    /// Acceptance is terminal; a repeat accept re-acks the owner without a
    /// second write or broadcast.
    async fn accept_answer(&self, message_id: &str) -> Result<(), AppError> {
        let deadline = self.store_deadline();

        let message = with_timeout(deadline, self.state.store.find_message(message_id))
            .await?
            .ok_or(AppError::MessageNotFound)?;
        let thread = with_timeout(deadline, self.state.store.find_thread(&message.thread_id))
            .await?
            .ok_or(AppError::ThreadNotFound)?;
        let room = with_timeout(
            deadline,
            self.state.store.find_room(&thread.room_id, &self.identity.id),
        )
        .await?
        .ok_or(AppError::RoomNotFound)?;

        if room.owner_id != self.identity.id {
            return Err(AppError::NotAuthorized(
                "only the room owner can accept answers",
            ));
        }
        if !message.is_answer {
            return Err(AppError::NotAuthorized(
                "message was not claimed as an answer",
            ));
        }

        let event = ServerEvent::AnswerAccepted {
            message_id: message.id.clone(),
            thread_id: thread.id.clone(),
        };

        if message.is_accepted {
            self.send(event).await;
            return Ok(());
        }

        with_timeout(
            deadline,
            self.state.store.update_message(
                &message.id,
                MessagePatch {
                    is_accepted: Some(true),
                },
            ),
        )
        .await?;

        let delivered = self.state.registry.broadcast(&room.id, event).await;
        counter!(keys::ANSWER_ACCEPTED).increment(1);
        info!(
            conn_id = %self.conn_id,
            room_id = %room.id,
            message_id = %message.id,
            delivered,
            "answer accepted"
        );
        Ok(())
    }

    /// Close a thread to further messages. Room-owner only; acked to the
    /// caller, not broadcast — other members observe closure through the
    /// REST layer.
    async fn close_thread(&self, thread_id: &str) -> Result<(), AppError> {
        let deadline = self.store_deadline();

        let thread = with_timeout(deadline, self.state.store.find_thread(thread_id))
            .await?
            .ok_or(AppError::ThreadNotFound)?;
        let room = with_timeout(
            deadline,
            self.state.store.find_room(&thread.room_id, &self.identity.id),
        )
        .await?
        .ok_or(AppError::RoomNotFound)?;

        if room.owner_id != self.identity.id {
            return Err(AppError::NotAuthorized(
                "only the room owner can close threads",
            ));
        }

        if thread.status != ThreadStatus::Closed {
            with_timeout(
                deadline,
                self.state.store.update_thread(
                    &thread.id,
                    ThreadPatch {
                        status: Some(ThreadStatus::Closed),
                        ..Default::default()
                    },
                ),
            )
            .await?;
            counter!(keys::THREAD_CLOSED).increment(1);
        }

        self.send(ServerEvent::ThreadClosed {
            thread_id: thread.id,
        })
        .await;
        Ok(())
    }

    /// Drop this connection from every room subscriber set. The only
    /// mandatory cleanup on disconnect, graceful or abrupt.
    pub fn disconnect(&self) {
        self.state.registry.leave_all(&self.conn_id);
        info!(conn_id = %self.conn_id, user = %self.identity.email, "client disconnected");
    }
}
