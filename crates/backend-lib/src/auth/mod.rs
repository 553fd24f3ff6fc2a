// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Connection authentication.

mod token;

pub use token::{issue_token, verify_token, Claims};

use crate::config::AuthSettings;
use crate::error::AppError;
use crate::storage::{with_timeout, Store};
use axum::http::HeaderMap;
use spaceqa_common::Identity;
use std::time::Duration;

/// Validates the bearer credential presented at connection time and resolves
/// it to a live identity before the upgrade completes.
#[derive(Clone)]
pub struct Authenticator {
    secret: String,
    token_ttl: Duration,
}

impl Authenticator {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            secret: settings.jwt_secret.clone(),
            token_ttl: Duration::from_secs(settings.token_ttl_secs),
        }
    }

    /// Mint a signed token for `identity`. Used by the REST layer that owns
    /// login, and by the tests.
    pub fn issue(&self, identity: &Identity) -> Result<String, AppError> {
        issue_token(&self.secret, identity, self.token_ttl)
    }

    /// Verify the presented credential and resolve the full identity from
    /// the store. Read-only; no partial connection state is retained on any
    /// failure path.
    pub async fn authenticate<S: Store>(
        &self,
        store: &S,
        raw_token: Option<&str>,
        store_deadline: Duration,
    ) -> Result<Identity, AppError> {
        let token = raw_token.ok_or(AppError::AuthenticationRequired)?;
        let claims = verify_token(&self.secret, token)?;

        with_timeout(store_deadline, store.find_user(&claims.sub))
            .await?
            .ok_or(AppError::IdentityNotFound)
    }
}

/// Extract a bearer credential from an `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
