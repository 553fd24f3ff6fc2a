// ================
// crates/common/src/lib.rs
// ================
//! Shared wire types for the spaceqa real-time Q&A protocol.
//! This crate defines the client/server event enums exchanged over the
//! WebSocket transport and the record types carried inside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated user identity attached to a connection after the handshake.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Lifecycle status of a Q&A thread.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Closed,
}

impl ThreadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Active => "active",
            ThreadStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ThreadStatus::Active),
            "closed" => Some(ThreadStatus::Closed),
            _ => None,
        }
    }
}

/// Compact thread view broadcast alongside every new message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    pub creator: Identity,
    pub created_at: DateTime<Utc>,
}

/// A single persisted entry in a thread.
///
/// `is_answer` is the author's claim; `is_accepted` is the room owner's
/// ratification and can only be true when `is_answer` is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: String,
    pub content: String,
    pub is_answer: bool,
    pub is_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub author: Identity,
}

/// Events sent from client to server.
///
/// The connect handshake is not an in-band event: the credential travels in
/// the upgrade request and authentication completes before any of these are
/// accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a room's broadcast set. Idempotent.
    JoinRoom { room_id: String },
    /// Submit a message, creating a new thread when `thread_id` is absent.
    SubmitMessage {
        room_id: String,
        #[serde(default)]
        thread_id: Option<String>,
        content: String,
        #[serde(default)]
        is_answer: bool,
    },
    /// Ratify a claimed answer. Room-owner only.
    AcceptAnswer { message_id: String },
    /// Close a thread to further messages. Room-owner only.
    CloseThread { thread_id: String },
}

/// Events sent from server to client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Join acknowledgment, sent to the requester only.
    JoinedRoom { room_id: String, room_name: String },
    /// Broadcast to every subscriber of the owning room, sender included.
    NewMessage {
        thread: ThreadSummary,
        message: MessageRecord,
    },
    /// Broadcast to every subscriber of the owning room.
    AnswerAccepted {
        message_id: String,
        thread_id: String,
    },
    /// Close acknowledgment, sent to the requester only.
    ThreadClosed { thread_id: String },
    /// Unicast to the connection that triggered the failure.
    Error { kind: String, message: String },
}
