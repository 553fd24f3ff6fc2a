// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core library for the spaceqa real-time Q&A server.
//!
//! The messaging layer of a multi-tenant knowledge-sharing platform:
//! per-connection bearer authentication, room membership with in-memory
//! subscriber sets, message fan-out, and the thread/answer transitions, all
//! backed by a durable store the REST layer shares.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod validation;
pub mod websocket;
pub mod ws_router;

pub use error::AppError;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::registry::ConnectionRegistry;
use std::sync::Arc;

/// Application state shared across all connections.
#[derive(Clone)]
pub struct AppState<S> {
    /// Connection authenticator
    pub auth: Authenticator,
    /// Room subscriber registry
    pub registry: ConnectionRegistry,
    /// Settings
    pub settings: Arc<Settings>,
    /// Durable store backend
    pub store: S,
}

impl<S> AppState<S> {
    /// Create a new application state
    pub fn new(store: S, settings: Settings) -> Self {
        let auth = Authenticator::new(&settings.auth);
        Self {
            auth,
            registry: ConnectionRegistry::new(),
            settings: Arc::new(settings),
            store,
        }
    }
}
