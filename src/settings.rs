// src/settings.rs
//! Layered service configuration.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config/certify.{toml,json,yaml}` when present
//! 3. `CERTIFY__<SECTION>__<KEY>` environment variables (e.g. `CERTIFY__AUTH__JWT_SECRET`)

use crate::services::batch_issuer::DEFAULT_BATCH_CONCURRENCY;
use crate::services::certificate_issuer::DEFAULT_MAX_IDENTIFIER_ATTEMPTS;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationSettings {
    /// Base of the shareable verification link
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifierSettings {
    pub certificate_prefix: String,
    pub code_length: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    pub concurrency: usize,
}

#[derive(Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret for bearer tokens; has no default
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    /// Journal file; the store is memory-only when unset
    pub journal_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSettings {
    /// JSON seed with courses, batches, holders and administrators
    pub seed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub verification: VerificationSettings,
    pub identifiers: IdentifierSettings,
    pub batch: BatchSettings,
    pub auth: AuthSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl Settings {
    /// Loads settings from the config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/certify").required(false))
            .add_source(
                Environment::with_prefix("CERTIFY")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("server.listen_addr", "127.0.0.1:3000")?
            .set_default("verification.public_base_url", "http://localhost:3000")?
            .set_default("identifiers.certificate_prefix", "CERT")?
            .set_default("identifiers.code_length", 10_i64)?
            .set_default(
                "identifiers.max_attempts",
                i64::from(DEFAULT_MAX_IDENTIFIER_ATTEMPTS),
            )?
            .set_default("batch.concurrency", DEFAULT_BATCH_CONCURRENCY as i64)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        if settings.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message(
                "auth.jwt_secret must not be empty".into(),
            ));
        }
        Ok(settings)
    }
}
