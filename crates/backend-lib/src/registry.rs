// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Room subscriber registry.
//!
//! The only shared mutable in-memory structure in the service: a map from
//! room id to the set of live connections currently joined to it. Connection
//! handles are opaque ids plus an outbound channel, never raw sockets, so
//! the transport layer and the registry share no ownership.

use crate::metrics as keys;
use dashmap::DashMap;
use metrics::counter;
use spaceqa_common::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::warn;

/// Opaque connection handle.
pub type ConnId = String;

/// Registry of room subscriber sets, injected into the components that need
/// it rather than living as a module-level singleton.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    rooms: Arc<DashMap<String, HashMap<ConnId, mpsc::Sender<ServerEvent>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn_id` to a room's subscriber set. Idempotent; returns whether
    /// the subscription is new.
    pub fn join(&self, room_id: &str, conn_id: &str, tx: mpsc::Sender<ServerEvent>) -> bool {
        let mut subscribers = self.rooms.entry(room_id.to_string()).or_default();
        subscribers
            .insert(conn_id.to_string(), tx)
            .is_none()
    }

    /// Remove `conn_id` from every subscriber set. Rooms left without
    /// subscribers are dropped from the map.
    pub fn leave_all(&self, conn_id: &str) {
        self.rooms.retain(|_, subscribers| {
            subscribers.remove(conn_id);
            !subscribers.is_empty()
        });
    }

    pub fn is_subscribed(&self, room_id: &str, conn_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|subscribers| subscribers.contains_key(conn_id))
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |s| s.len())
    }

    /// Fan an event out to every subscriber of `room_id`; returns the number
    /// of connections it was delivered to.
    ///
    /// Sends run concurrently and a failed subscriber never blocks the rest.
    pub async fn broadcast(&self, room_id: &str, event: ServerEvent) -> usize {
        let senders: Vec<mpsc::Sender<ServerEvent>> = match self.rooms.get(room_id) {
            Some(subscribers) => subscribers.values().cloned().collect(),
            None => return 0,
        };
        if senders.is_empty() {
            return 0;
        }

        let mut tasks = JoinSet::new();
        for tx in senders {
            let event = event.clone();
            tasks.spawn(async move { tx.send(event).await.is_ok() });
        }

        let mut delivered = 0usize;
        let mut failed = 0usize;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => delivered += 1,
                _ => failed += 1,
            }
        }

        if failed > 0 {
            counter!(keys::BROADCAST_FAILED).increment(failed as u64);
            warn!(room_id, failed, "subscribers missed a broadcast");
        }

        delivered
    }
}
