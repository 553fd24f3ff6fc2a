// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// SQLite database URL
    pub database_url: String,
    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
    /// Credential verification settings
    pub auth: AuthSettings,
    /// Runtime limits
    pub limits: LimitSettings,
}

/// Bearer-credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret for token signatures
    pub jwt_secret: String,
    /// Token lifetime in seconds
    pub token_ttl_secs: u64,
}

/// Runtime limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Per-call store deadline in milliseconds
    pub store_timeout_ms: u64,
    /// Outbound event buffer per connection
    pub outbound_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            database_url: "sqlite://spaceqa.db?mode=rwc".to_string(),
            log_filter: "info".to_string(),
            auth: AuthSettings::default(),
            limits: LimitSettings::default(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            token_ttl_secs: 60 * 60 * 24 * 7, // 7 days
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: 3000,
            outbound_buffer: 32,
        }
    }
}

impl LimitSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Settings {
    /// Load settings from `spaceqa.toml` and `SPACEQA_`-prefixed environment
    /// variables, on top of the defaults. Nested keys use `__` in the
    /// environment (`SPACEQA_AUTH__JWT_SECRET`).
    pub fn load() -> Result<Self> {
        Self::load_from("spaceqa.toml")
    }

    /// Load settings with an explicit config file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SPACEQA_").split("__"))
            .extract()?;

        Ok(settings)
    }
}
