// ============================
// crates/backend-lib/src/storage/sqlite.rs
// ============================
//! SQLite store backend.

use super::{MessagePatch, RoomRecord, Store, ThreadPatch, ThreadRecord};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spaceqa_common::{Identity, MessageRecord, ThreadStatus};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id    TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        role  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS rooms (
        id       TEXT PRIMARY KEY,
        name     TEXT NOT NULL,
        owner_id TEXT NOT NULL REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS memberships (
        user_id TEXT NOT NULL,
        room_id TEXT NOT NULL,
        status  TEXT NOT NULL DEFAULT 'free',
        PRIMARY KEY (user_id, room_id)
    )",
    "CREATE TABLE IF NOT EXISTS threads (
        id         TEXT PRIMARY KEY,
        room_id    TEXT NOT NULL REFERENCES rooms(id),
        created_by TEXT NOT NULL REFERENCES users(id),
        title      TEXT NOT NULL,
        status     TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id          TEXT PRIMARY KEY,
        thread_id   TEXT NOT NULL REFERENCES threads(id),
        user_id     TEXT NOT NULL REFERENCES users(id),
        content     TEXT NOT NULL,
        is_answer   INTEGER NOT NULL DEFAULT 0,
        is_accepted INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_threads_room_updated
        ON threads(room_id, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_messages_thread_created
        ON messages(thread_id, created_at)",
];

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` and bootstrap the schema.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Provisioning hooks for the REST layer that owns signup/room creation,
    /// and for tests.
    pub async fn insert_user(&self, identity: &Identity) -> Result<(), AppError> {
        sqlx::query("INSERT OR REPLACE INTO users (id, email, role) VALUES (?, ?, ?)")
            .bind(&identity.id)
            .bind(&identity.email)
            .bind(&identity.role)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_room(&self, id: &str, name: &str, owner_id: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR REPLACE INTO rooms (id, name, owner_id) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_membership(
        &self,
        user_id: &str,
        room_id: &str,
        status: &str,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT OR REPLACE INTO memberships (user_id, room_id, status) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(room_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_status(raw: &str) -> Result<ThreadStatus, AppError> {
    ThreadStatus::parse(raw).ok_or_else(|| AppError::Store(format!("invalid thread status: {raw}")))
}

type ThreadRow = (
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    String,
    String,
);

fn thread_from_row(row: ThreadRow) -> Result<ThreadRecord, AppError> {
    let (id, room_id, title, status, created_at, updated_at, uid, email, role) = row;
    Ok(ThreadRecord {
        id,
        room_id,
        title,
        status: parse_status(&status)?,
        creator: Identity {
            id: uid,
            email,
            role,
        },
        created_at,
        updated_at,
    })
}

type MessageRow = (
    String,
    String,
    String,
    bool,
    bool,
    DateTime<Utc>,
    String,
    String,
    String,
);

fn message_from_row(row: MessageRow) -> MessageRecord {
    let (id, thread_id, content, is_answer, is_accepted, created_at, uid, email, role) = row;
    MessageRecord {
        id,
        thread_id,
        content,
        is_answer,
        is_accepted,
        created_at,
        author: Identity {
            id: uid,
            email,
            role,
        },
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_user(&self, id: &str) -> Result<Option<Identity>, AppError> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, email, role FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, email, role)| Identity { id, email, role }))
    }

    async fn find_room(&self, id: &str, member: &str) -> Result<Option<RoomRecord>, AppError> {
        let row: Option<(String, String, String, i64)> = sqlx::query_as(
            "SELECT r.id, r.name, r.owner_id,
                    (SELECT COUNT(*) FROM memberships m
                      WHERE m.room_id = r.id AND m.user_id = ?)
               FROM rooms r WHERE r.id = ?",
        )
        .bind(member)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name, owner_id, memberships)| RoomRecord {
            id,
            name,
            owner_id,
            is_member: memberships > 0,
        }))
    }

    async fn create_thread(
        &self,
        room_id: &str,
        creator: &Identity,
        title: &str,
    ) -> Result<ThreadRecord, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO threads (id, room_id, created_by, title, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(room_id)
        .bind(&creator.id)
        .bind(title)
        .bind(ThreadStatus::Active.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ThreadRecord {
            id,
            room_id: room_id.to_string(),
            title: title.to_string(),
            status: ThreadStatus::Active,
            creator: creator.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_thread(&self, id: &str) -> Result<Option<ThreadRecord>, AppError> {
        let row: Option<ThreadRow> = sqlx::query_as(
            "SELECT t.id, t.room_id, t.title, t.status, t.created_at, t.updated_at,
                    u.id, u.email, u.role
               FROM threads t JOIN users u ON u.id = t.created_by
              WHERE t.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(thread_from_row).transpose()
    }

    async fn update_thread(&self, id: &str, patch: ThreadPatch) -> Result<(), AppError> {
        if let Some(status) = patch.status {
            sqlx::query("UPDATE threads SET status = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        if let Some(touched_at) = patch.touched_at {
            sqlx::query("UPDATE threads SET updated_at = ? WHERE id = ?")
                .bind(touched_at)
                .bind(id)
                .execute(&self.pool)
                .await?;
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
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO messages (id, thread_id, user_id, content, is_answer, is_accepted, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(thread_id)
        .bind(&author.id)
        .bind(content)
        .bind(is_answer)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(MessageRecord {
            id,
            thread_id: thread_id.to_string(),
            content: content.to_string(),
            is_answer,
            is_accepted: false,
            created_at: now,
            author: author.clone(),
        })
    }

    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>, AppError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT m.id, m.thread_id, m.content, m.is_answer, m.is_accepted, m.created_at,
                    u.id, u.email, u.role
               FROM messages m JOIN users u ON u.id = m.user_id
              WHERE m.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(message_from_row))
    }

    async fn update_message(&self, id: &str, patch: MessagePatch) -> Result<(), AppError> {
        if let Some(is_accepted) = patch.is_accepted {
            sqlx::query("UPDATE messages SET is_accepted = ? WHERE id = ?")
                .bind(is_accepted)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn list_threads(
        &self,
        room_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadRecord>, AppError> {
        let rows: Vec<ThreadRow> = sqlx::query_as(
            "SELECT t.id, t.room_id, t.title, t.status, t.created_at, t.updated_at,
                    u.id, u.email, u.role
               FROM threads t JOIN users u ON u.id = t.created_by
              WHERE t.room_id = ?
              ORDER BY t.updated_at DESC
              LIMIT ? OFFSET ?",
        )
        .bind(room_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(thread_from_row).collect()
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, AppError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT m.id, m.thread_id, m.content, m.is_answer, m.is_accepted, m.created_at,
                    u.id, u.email, u.role
               FROM messages m JOIN users u ON u.id = m.user_id
              WHERE m.thread_id = ?
              ORDER BY m.created_at ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(message_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

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

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_user(&owner()).await.unwrap();
        store.insert_user(&member()).await.unwrap();
        store.insert_room("r1", "Rust Help", "owner").await.unwrap();
        store
            .insert_membership("member", "r1", "free")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_connect_bootstraps_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("spaceqa-test.db").display()
        );

        let store = SqliteStore::connect(&url).await.unwrap();
        store.insert_user(&owner()).await.unwrap();
        assert_eq!(store.find_user("owner").await.unwrap(), Some(owner()));
    }

    #[tokio::test]
    async fn test_find_user() {
        let store = seeded().await;
        assert_eq!(store.find_user("owner").await.unwrap(), Some(owner()));
        assert_eq!(store.find_user("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_room_membership_resolution() {
        let store = seeded().await;

        let as_member = store.find_room("r1", "member").await.unwrap().unwrap();
        assert!(as_member.is_member);
        assert_eq!(as_member.name, "Rust Help");
        assert_eq!(as_member.owner_id, "owner");

        let as_stranger = store.find_room("r1", "stranger").await.unwrap().unwrap();
        assert!(!as_stranger.is_member);

        assert!(store.find_room("nope", "member").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_thread_and_message_roundtrip() {
        let store = seeded().await;
        let thread = store
            .create_thread("r1", &member(), "How do I start?")
            .await
            .unwrap();

        let loaded = store.find_thread(&thread.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "How do I start?");
        assert_eq!(loaded.status, ThreadStatus::Active);
        assert_eq!(loaded.creator, member());

        let message = store
            .create_message(&thread.id, &owner(), "Read the docs first.", true)
            .await
            .unwrap();
        let loaded = store.find_message(&message.id).await.unwrap().unwrap();
        assert!(loaded.is_answer);
        assert!(!loaded.is_accepted);
        assert_eq!(loaded.author, owner());

        store
            .update_message(
                &message.id,
                MessagePatch {
                    is_accepted: Some(true),
                },
            )
            .await
            .unwrap();
        assert!(
            store
                .find_message(&message.id)
                .await
                .unwrap()
                .unwrap()
                .is_accepted
        );
    }

    #[tokio::test]
    async fn test_close_thread_persists() {
        let store = seeded().await;
        let thread = store.create_thread("r1", &owner(), "t").await.unwrap();

        store
            .update_thread(
                &thread.id,
                ThreadPatch {
                    status: Some(ThreadStatus::Closed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let loaded = store.find_thread(&thread.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ThreadStatus::Closed);
    }

    #[tokio::test]
    async fn test_list_threads_orders_by_recency() {
        let store = seeded().await;
        let first = store.create_thread("r1", &owner(), "first").await.unwrap();
        let _second = store.create_thread("r1", &owner(), "second").await.unwrap();

        store
            .update_thread(
                &first.id,
                ThreadPatch {
                    touched_at: Some(Utc::now() + ChronoDuration::seconds(60)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let threads = store.list_threads("r1", 10, 0).await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, first.id);
    }

    #[tokio::test]
    async fn test_list_messages_in_creation_order() {
        let store = seeded().await;
        let thread = store.create_thread("r1", &member(), "t").await.unwrap();
        let m1 = store
            .create_message(&thread.id, &member(), "one", false)
            .await
            .unwrap();
        let m2 = store
            .create_message(&thread.id, &owner(), "two", false)
            .await
            .unwrap();

        let messages = store.list_messages(&thread.id).await.unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert!(ids.contains(&m1.id.as_str()));
        assert!(ids.contains(&m2.id.as_str()));
        assert_eq!(messages.len(), 2);
        assert!(messages[0].created_at <= messages[1].created_at);
    }
}
