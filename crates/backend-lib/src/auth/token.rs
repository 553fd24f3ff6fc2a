// ============================
// crates/backend-lib/src/auth/token.rs
// ============================
//! Signed bearer tokens.

use crate::error::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use spaceqa_common::Identity;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Token claims. `sub` carries the user id; `email` and `role` ride along so
/// the excluded REST layer can render without a lookup, but identity
/// resolution always goes back to the store.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sign a token for `identity` valid for `ttl`.
pub fn issue_token(secret: &str, identity: &Identity, ttl: Duration) -> Result<String, AppError> {
    let now = unix_now();
    let claims = Claims {
        sub: identity.id.clone(),
        email: identity.email.clone(),
        role: identity.role.clone(),
        exp: now + ttl.as_secs(),
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
}

/// Verify signature and expiry; any failure maps to `AuthenticationFailed`.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::AuthenticationFailed)
}
