// ============================
// crates/backend-lib/src/storage/mod.rs
// ============================
//! Storage abstraction over the durable record-of-truth.
//!
//! The messaging core never owns durable state: rooms, threads and messages
//! live behind this trait, and the subscriber sets stay purely in memory.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spaceqa_common::{Identity, MessageRecord, ThreadStatus, ThreadSummary};
use std::future::Future;
use std::time::Duration;

/// A room as the membership check sees it. The subscriber set is runtime
/// state and never part of this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Whether the querying identity holds any membership record, paid or
    /// free alike.
    pub is_member: bool,
}

/// A persisted Q&A thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub id: String,
    pub room_id: String,
    pub title: String,
    pub status: ThreadStatus,
    pub creator: Identity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadRecord {
    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            creator: self.creator.clone(),
            created_at: self.created_at,
        }
    }
}

/// Partial thread update.
#[derive(Debug, Clone, Default)]
pub struct ThreadPatch {
    pub status: Option<ThreadStatus>,
    /// New recency timestamp; set on every message appended to an existing
    /// thread so the REST layer can order threads by activity.
    pub touched_at: Option<DateTime<Utc>>,
}

/// Partial message update.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub is_accepted: Option<bool>,
}

/// Trait for durable store backends.
#[async_trait]
pub trait Store: Send + Sync {
    /// Resolve a user id to its identity.
    async fn find_user(&self, id: &str) -> Result<Option<Identity>, AppError>;

    /// Load a room together with `member`'s membership status.
    async fn find_room(&self, id: &str, member: &str) -> Result<Option<RoomRecord>, AppError>;

    /// Create a thread in `room_id` with status `active`.
    async fn create_thread(
        &self,
        room_id: &str,
        creator: &Identity,
        title: &str,
    ) -> Result<ThreadRecord, AppError>;

    async fn find_thread(&self, id: &str) -> Result<Option<ThreadRecord>, AppError>;

    async fn update_thread(&self, id: &str, patch: ThreadPatch) -> Result<(), AppError>;

    /// Persist a message. `is_accepted` always starts false.
    async fn create_message(
        &self,
        thread_id: &str,
        author: &Identity,
        content: &str,
        is_answer: bool,
    ) -> Result<MessageRecord, AppError>;

    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>, AppError>;

    async fn update_message(&self, id: &str, patch: MessagePatch) -> Result<(), AppError>;

    /// Threads of a room, most recently active first.
    async fn list_threads(
        &self,
        room_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadRecord>, AppError>;

    /// Messages of a thread in creation order.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, AppError>;
}

/// Bound a store call with a deadline; expiry surfaces as
/// [`AppError::StoreUnavailable`] rather than a business-logic error.
pub async fn with_timeout<T, F>(deadline: Duration, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| AppError::StoreUnavailable)?
}
