// ============================
// crates/backend-lib/src/storage/memory.rs
// ============================
//! In-memory store backend.
//!
//! Backs the test suite and dev mode. Seeding helpers stand in for the
//! user/room provisioning the excluded REST layer performs in production.

use super::{MessagePatch, RoomRecord, Store, ThreadPatch, ThreadRecord};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use spaceqa_common::{Identity, MessageRecord, ThreadStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct RoomRow {
    name: String,
    owner_id: String,
}

#[derive(Default)]
struct Inner {
    users: RwLock<HashMap<String, Identity>>,
    rooms: RwLock<HashMap<String, RoomRow>>,
    /// (user id, room id) pairs; status is irrelevant to this subsystem.
    memberships: RwLock<HashSet<(String, String)>>,
    threads: RwLock<HashMap<String, ThreadRecord>>,
    messages: RwLock<HashMap<String, MessageRecord>>,
}

/// Heap-shared in-memory implementation of the [`Store`] trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, identity: Identity) {
        self.inner
            .users
            .write()
            .insert(identity.id.clone(), identity);
    }

    pub fn add_room(&self, id: &str, name: &str, owner_id: &str) {
        self.inner.rooms.write().insert(
            id.to_string(),
            RoomRow {
                name: name.to_string(),
                owner_id: owner_id.to_string(),
            },
        );
    }

    pub fn add_membership(&self, user_id: &str, room_id: &str) {
        self.inner
            .memberships
            .write()
            .insert((user_id.to_string(), room_id.to_string()));
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<Identity>, AppError> {
        Ok(self.inner.users.read().get(id).cloned())
    }

    async fn find_room(&self, id: &str, member: &str) -> Result<Option<RoomRecord>, AppError> {
        let rooms = self.inner.rooms.read();
        let Some(row) = rooms.get(id) else {
            return Ok(None);
        };
        let is_member = self
            .inner
            .memberships
            .read()
            .contains(&(member.to_string(), id.to_string()));

        Ok(Some(RoomRecord {
            id: id.to_string(),
            name: row.name.clone(),
            owner_id: row.owner_id.clone(),
            is_member,
        }))
    }

    async fn create_thread(
        &self,
        room_id: &str,
        creator: &Identity,
        title: &str,
    ) -> Result<ThreadRecord, AppError> {
        let now = Utc::now();
        let thread = ThreadRecord {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            title: title.to_string(),
            status: ThreadStatus::Active,
            creator: creator.clone(),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .threads
            .write()
            .insert(thread.id.clone(), thread.clone());
        Ok(thread)
    }

    async fn find_thread(&self, id: &str) -> Result<Option<ThreadRecord>, AppError> {
        Ok(self.inner.threads.read().get(id).cloned())
    }

    async fn update_thread(&self, id: &str, patch: ThreadPatch) -> Result<(), AppError> {
        let mut threads = self.inner.threads.write();
        let thread = threads
            .get_mut(id)
            .ok_or_else(|| AppError::Store(format!("no such thread: {id}")))?;
        if let Some(status) = patch.status {
            thread.status = status;
        }
        if let Some(touched_at) = patch.touched_at {
            thread.updated_at = touched_at;
        }
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: &str,
        author: &Identity,
        content: &str,
        is_answer: bool,
    ) -> Result<MessageRecord, AppError> {
        let message = MessageRecord {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            content: content.to_string(),
            is_answer,
            is_accepted: false,
            created_at: Utc::now(),
            author: author.clone(),
        };
        self.inner
            .messages
            .write()
            .insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>, AppError> {
        Ok(self.inner.messages.read().get(id).cloned())
    }

    async fn update_message(&self, id: &str, patch: MessagePatch) -> Result<(), AppError> {
        let mut messages = self.inner.messages.write();
        let message = messages
            .get_mut(id)
            .ok_or_else(|| AppError::Store(format!("no such message: {id}")))?;
        if let Some(is_accepted) = patch.is_accepted {
            message.is_accepted = is_accepted;
        }
        Ok(())
    }

    async fn list_threads(
        &self,
        room_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadRecord>, AppError> {
        let mut threads: Vec<ThreadRecord> = self
            .inner
            .threads
            .read()
            .values()
            .filter(|t| t.room_id == room_id)
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(threads
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, AppError> {
        let mut messages: Vec<MessageRecord> = self
            .inner
            .messages
            .read()
            .values()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }
}
