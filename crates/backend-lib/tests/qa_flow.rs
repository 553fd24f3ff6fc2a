// ==========================
// crates/backend-lib/tests/qa_flow.rs
// ==========================
//! End-to-end flows through the event handler: room membership, message
//! fan-out, and the thread/answer transitions, driven over real outbound
//! channels against the in-memory store.

use async_trait::async_trait;
use spaceqa_backend_lib::config::Settings;
use spaceqa_backend_lib::error::AppError;
use spaceqa_backend_lib::storage::{
    MemoryStore, MessagePatch, RoomRecord, Store, ThreadPatch, ThreadRecord,
};
use spaceqa_backend_lib::websocket::EventHandler;
use spaceqa_backend_lib::AppState;
use spaceqa_common::{ClientEvent, Identity, MessageRecord, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn owner() -> Identity {
    Identity {
        id: "owner".to_string(),
        email: "owner@example.com".to_string(),
        role: "creator".to_string(),
    }
}

fn member() -> Identity {
    Identity {
        id: "member".to_string(),
        email: "member@example.com".to_string(),
        role: "member".to_string(),
    }
}

fn stranger() -> Identity {
    Identity {
        id: "stranger".to_string(),
        email: "stranger@example.com".to_string(),
        role: "member".to_string(),
    }
}

/// Seed the store the way the REST layer would have: one room, its owner,
/// one member, one user with no relationship to the room.
fn test_state() -> Arc<AppState<MemoryStore>> {
    let store = MemoryStore::new();
    store.add_user(owner());
    store.add_user(member());
    store.add_user(stranger());
    store.add_room("r1", "Rust Help", "owner");
    store.add_membership("member", "r1");
    Arc::new(AppState::new(store, Settings::default()))
}

fn connect(
    state: &Arc<AppState<MemoryStore>>,
    identity: Identity,
) -> (EventHandler<MemoryStore>, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(32);
    (EventHandler::new(state.clone(), identity, tx), rx)
}

fn recv(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    rx.try_recv().expect("expected a queued event")
}

fn assert_no_event(rx: &mut mpsc::Receiver<ServerEvent>) {
    assert!(rx.try_recv().is_err(), "expected no queued event");
}

fn error_kind(event: ServerEvent) -> String {
    match event {
        ServerEvent::Error { kind, .. } => kind,
        other => panic!("expected error event, got {other:?}"),
    }
}

async fn join(handler: &EventHandler<MemoryStore>, room_id: &str) {
    handler
        .dispatch(ClientEvent::JoinRoom {
            room_id: room_id.to_string(),
        })
        .await;
}

async fn submit(
    handler: &EventHandler<MemoryStore>,
    thread_id: Option<&str>,
    content: &str,
    is_answer: bool,
) {
    handler
        .dispatch(ClientEvent::SubmitMessage {
            room_id: "r1".to_string(),
            thread_id: thread_id.map(str::to_string),
            content: content.to_string(),
            is_answer,
        })
        .await;
}

fn new_message(event: ServerEvent) -> (spaceqa_common::ThreadSummary, MessageRecord) {
    match event {
        ServerEvent::NewMessage { thread, message } => (thread, message),
        other => panic!("expected new_message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stranger_is_denied_and_never_subscribed() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, stranger());

    join(&handler, "r1").await;

    assert_eq!(error_kind(recv(&mut rx)), "access_denied");
    assert_eq!(state.registry.subscriber_count("r1"), 0);
}

#[tokio::test]
async fn test_unknown_room_is_reported_to_requester_only() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, member());

    join(&handler, "r404").await;

    assert_eq!(error_kind(recv(&mut rx)), "room_not_found");
    assert_eq!(state.registry.subscriber_count("r404"), 0);
}

#[tokio::test]
async fn test_join_is_idempotent_and_reacked() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, member());

    join(&handler, "r1").await;
    join(&handler, "r1").await;

    let expected = ServerEvent::JoinedRoom {
        room_id: "r1".to_string(),
        room_name: "Rust Help".to_string(),
    };
    assert_eq!(recv(&mut rx), expected);
    assert_eq!(recv(&mut rx), expected);
    assert_eq!(state.registry.subscriber_count("r1"), 1);
}

#[tokio::test]
async fn test_owner_may_join_without_membership_record() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, owner());

    join(&handler, "r1").await;

    assert!(matches!(recv(&mut rx), ServerEvent::JoinedRoom { .. }));
    assert_eq!(state.registry.subscriber_count("r1"), 1);
}

#[tokio::test]
async fn test_first_message_creates_thread_and_fans_out() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    submit(&member_conn, None, "How do I start?", false).await;

    let (thread, message) = new_message(recv(&mut member_rx));
    assert_eq!(thread.title, "How do I start?");
    assert_eq!(thread.creator, member());
    assert_eq!(message.content, "How do I start?");
    assert!(!message.is_answer);
    assert!(!message.is_accepted);
    assert_eq!(message.author, member());

    // the same single event reached the other subscriber
    let (owner_thread, owner_message) = new_message(recv(&mut owner_rx));
    assert_eq!(owner_thread.id, thread.id);
    assert_eq!(owner_message.id, message.id);
    assert_no_event(&mut owner_rx);
    assert_no_event(&mut member_rx);

    // and the thread is durable
    let stored = state.store.find_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "How do I start?");
}

#[tokio::test]
async fn test_long_first_message_gets_truncated_title() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, member());
    join(&handler, "r1").await;
    recv(&mut rx);

    let content = "x".repeat(150);
    submit(&handler, None, &content, false).await;

    let (thread, message) = new_message(recv(&mut rx));
    assert_eq!(thread.title, format!("{}...", "x".repeat(100)));
    assert_eq!(message.content, content);
}

#[tokio::test]
async fn test_whitespace_content_is_rejected_without_side_effects() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    submit(&member_conn, None, "   \n\t ", false).await;

    assert_eq!(error_kind(recv(&mut member_rx)), "empty_content");
    assert_no_event(&mut owner_rx);
    assert!(state.store.list_threads("r1", 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_to_unknown_thread_is_rejected() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, member());
    join(&handler, "r1").await;
    recv(&mut rx);

    submit(&handler, Some("t404"), "hello?", false).await;

    assert_eq!(error_kind(recv(&mut rx)), "thread_not_found");
}

#[tokio::test]
async fn test_submit_without_join_reaches_subscribers_only() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    join(&owner_conn, "r1").await;
    recv(&mut owner_rx);

    // the member never joined; join and submit are independent capabilities
    let (member_conn, mut member_rx) = connect(&state, member());
    submit(&member_conn, None, "drive-by question", false).await;

    let (_, message) = new_message(recv(&mut owner_rx));
    assert_eq!(message.author, member());
    // the sender is not subscribed, so no echo comes back
    assert_no_event(&mut member_rx);
}

#[tokio::test]
async fn test_reply_bumps_thread_recency() {
    let state = test_state();
    let (handler, mut rx) = connect(&state, member());
    join(&handler, "r1").await;
    recv(&mut rx);

    submit(&handler, None, "older thread", false).await;
    let (older, _) = new_message(recv(&mut rx));
    submit(&handler, None, "newer thread", false).await;
    let (newer, _) = new_message(recv(&mut rx));

    submit(&handler, Some(&older.id), "bump", false).await;
    recv(&mut rx);

    let threads = state.store.list_threads("r1", 10, 0).await.unwrap();
    assert_eq!(threads[0].id, older.id);
    assert_eq!(threads[1].id, newer.id);
}

#[tokio::test]
async fn test_answer_accept_flow_end_to_end() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    // member asks
    submit(&member_conn, None, "How do I start?", false).await;
    let (thread, _) = new_message(recv(&mut member_rx));
    recv(&mut owner_rx);

    // owner replies, claiming an answer
    submit(&owner_conn, Some(&thread.id), "Read the docs first.", true).await;
    let (_, reply) = new_message(recv(&mut owner_rx));
    let (_, member_view) = new_message(recv(&mut member_rx));
    assert!(reply.is_answer);
    assert!(!reply.is_accepted);
    assert_eq!(member_view.id, reply.id);

    // owner ratifies
    owner_conn
        .dispatch(ClientEvent::AcceptAnswer {
            message_id: reply.id.clone(),
        })
        .await;

    let expected = ServerEvent::AnswerAccepted {
        message_id: reply.id.clone(),
        thread_id: thread.id.clone(),
    };
    assert_eq!(recv(&mut owner_rx), expected);
    assert_eq!(recv(&mut member_rx), expected);

    let stored = state.store.find_message(&reply.id).await.unwrap().unwrap();
    assert!(stored.is_accepted);
}

#[tokio::test]
async fn test_accept_is_owner_only() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    submit(&member_conn, None, "question", false).await;
    let (thread, _) = new_message(recv(&mut member_rx));
    recv(&mut owner_rx);
    submit(&member_conn, Some(&thread.id), "my own answer", true).await;
    let (_, claimed) = new_message(recv(&mut member_rx));
    recv(&mut owner_rx);

    member_conn
        .dispatch(ClientEvent::AcceptAnswer {
            message_id: claimed.id.clone(),
        })
        .await;

    assert_eq!(error_kind(recv(&mut member_rx)), "not_authorized");
    assert_no_event(&mut owner_rx);
    let stored = state.store.find_message(&claimed.id).await.unwrap().unwrap();
    assert!(!stored.is_accepted);
}

#[tokio::test]
async fn test_accept_requires_a_claimed_answer() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    join(&owner_conn, "r1").await;
    recv(&mut owner_rx);

    submit(&owner_conn, None, "not claimed as an answer", false).await;
    let (_, message) = new_message(recv(&mut owner_rx));

    owner_conn
        .dispatch(ClientEvent::AcceptAnswer {
            message_id: message.id.clone(),
        })
        .await;

    assert_eq!(error_kind(recv(&mut owner_rx)), "not_authorized");
    let stored = state.store.find_message(&message.id).await.unwrap().unwrap();
    assert!(!stored.is_accepted);
}

#[tokio::test]
async fn test_repeat_accept_is_acked_without_rebroadcast() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    submit(&owner_conn, None, "answered immediately", true).await;
    let (_, message) = new_message(recv(&mut owner_rx));
    recv(&mut member_rx);

    let accept = ClientEvent::AcceptAnswer {
        message_id: message.id.clone(),
    };
    owner_conn.dispatch(accept.clone()).await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    owner_conn.dispatch(accept).await;
    assert!(matches!(
        recv(&mut owner_rx),
        ServerEvent::AnswerAccepted { .. }
    ));
    // acceptance is terminal; other subscribers hear about it once
    assert_no_event(&mut member_rx);
}

#[tokio::test]
async fn test_close_thread_is_owner_only_and_acked() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    submit(&member_conn, None, "question", false).await;
    let (thread, _) = new_message(recv(&mut member_rx));
    recv(&mut owner_rx);

    member_conn
        .dispatch(ClientEvent::CloseThread {
            thread_id: thread.id.clone(),
        })
        .await;
    assert_eq!(error_kind(recv(&mut member_rx)), "not_authorized");

    owner_conn
        .dispatch(ClientEvent::CloseThread {
            thread_id: thread.id.clone(),
        })
        .await;
    assert_eq!(
        recv(&mut owner_rx),
        ServerEvent::ThreadClosed {
            thread_id: thread.id.clone()
        }
    );
    // closure is acked to the caller, not broadcast
    assert_no_event(&mut member_rx);

    // and the closed thread refuses further messages
    submit(&member_conn, Some(&thread.id), "too late", false).await;
    assert_eq!(error_kind(recv(&mut member_rx)), "thread_closed");
    assert_no_event(&mut owner_rx);
}

#[tokio::test]
async fn test_disconnect_prunes_every_subscription() {
    let state = test_state();
    let (owner_conn, mut owner_rx) = connect(&state, owner());
    let (member_conn, mut member_rx) = connect(&state, member());
    join(&owner_conn, "r1").await;
    join(&member_conn, "r1").await;
    recv(&mut owner_rx);
    recv(&mut member_rx);

    member_conn.disconnect();
    assert_eq!(state.registry.subscriber_count("r1"), 1);

    submit(&owner_conn, None, "anyone here?", false).await;
    assert!(matches!(recv(&mut owner_rx), ServerEvent::NewMessage { .. }));
    assert_no_event(&mut member_rx);
}

/// Store wrapper that stalls lookups past the configured deadline.
#[derive(Clone)]
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl Store for SlowStore {
    async fn find_user(&self, id: &str) -> Result<Option<Identity>, AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_user(id).await
    }

    async fn find_room(&self, id: &str, member: &str) -> Result<Option<RoomRecord>, AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_room(id, member).await
    }

    async fn create_thread(
        &self,
        room_id: &str,
        creator: &Identity,
        title: &str,
    ) -> Result<ThreadRecord, AppError> {
        self.inner.create_thread(room_id, creator, title).await
    }

    async fn find_thread(&self, id: &str) -> Result<Option<ThreadRecord>, AppError> {
        self.inner.find_thread(id).await
    }

    async fn update_thread(&self, id: &str, patch: ThreadPatch) -> Result<(), AppError> {
        self.inner.update_thread(id, patch).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        author: &Identity,
        content: &str,
        is_answer: bool,
    ) -> Result<MessageRecord, AppError> {
        self.inner
            .create_message(thread_id, author, content, is_answer)
            .await
    }

    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>, AppError> {
        self.inner.find_message(id).await
    }

    async fn update_message(&self, id: &str, patch: MessagePatch) -> Result<(), AppError> {
        self.inner.update_message(id, patch).await
    }

    async fn list_threads(
        &self,
        room_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadRecord>, AppError> {
        self.inner.list_threads(room_id, limit, offset).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, AppError> {
        self.inner.list_messages(thread_id).await
    }
}

#[tokio::test]
async fn test_store_deadline_surfaces_as_unavailable() {
    let inner = MemoryStore::new();
    inner.add_user(member());
    inner.add_room("r1", "Rust Help", "owner");
    inner.add_membership("member", "r1");

    let mut settings = Settings::default();
    settings.limits.store_timeout_ms = 20;
    let state = Arc::new(AppState::new(
        SlowStore {
            inner,
            delay: Duration::from_millis(200),
        },
        settings,
    ));

    let (tx, mut rx) = mpsc::channel(8);
    let handler = EventHandler::new(state, member(), tx);
    handler
        .dispatch(ClientEvent::JoinRoom {
            room_id: "r1".to_string(),
        })
        .await;

    assert_eq!(error_kind(recv(&mut rx)), "store_unavailable");
}
