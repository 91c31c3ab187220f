// src/main.rs

//! # Certify - Main Entry Point
//!
//! Issues course completion certificates and serves public verification.
//! This module loads configuration, wires the services together and starts the
//! API server.
//!
//! ## Architecture Overview
//! 1. **Storage Layer**: `MemoryCertificateStore`, optionally backed by a JSON-lines journal
//! 2. **Catalog**: courses, batches, holders and administrators loaded from a seed file
//! 3. **Services Layer**: issuance, batch issuance, verification, revocation
//! 4. **API Layer**: Axum routes with bearer-token actor resolution
//!
//! ## Configuration
//! See [`settings`]. `CERTIFY__AUTH__JWT_SECRET` is the only required value.

use crate::services::api_server::ApiServer;
use crate::services::authenticator::TokenAuthenticator;
use crate::services::batch_issuer::BatchIssuer;
use crate::services::catalog::{Catalog, CatalogSeed};
use crate::services::certificate_issuer::CertificateIssuer;
use crate::services::revocation::RevocationService;
use crate::services::verifier::Verifier;
use crate::settings::Settings;
use crate::storage::memory_store::MemoryCertificateStore;
use crate::storage::CertificateStore;
use crate::utils::identifiers::RandomIdentifiers;
use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod error;         // Service errors and their HTTP mapping
mod models;        // Data structures
mod services;      // Business logic and API
mod settings;      // Layered configuration
mod storage;       // Certificate store and journal
mod utils;         // Hashing and identifier generation

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        log::error!("fatal: {:#}", err);
        std::process::exit(1);
    }
}

/// # Initialization Sequence
/// 1. Load settings
/// 2. Open the store and replay the journal
/// 3. Load the catalog
/// 4. Build services and serve until Ctrl-C
async fn run() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;

    let store: Arc<dyn CertificateStore> = match &settings.storage.journal_path {
        Some(path) => Arc::new(
            MemoryCertificateStore::with_journal(path)
                .await
                .with_context(|| format!("failed to open journal {}", path.display()))?,
        ),
        None => {
            log::warn!("no storage.journal_path configured, certificates will not survive a restart");
            Arc::new(MemoryCertificateStore::new())
        }
    };

    let catalog = Arc::new(match &settings.catalog.seed_path {
        Some(path) => Catalog::load(path)?,
        None => {
            log::warn!("no catalog.seed_path configured, starting with an empty catalog");
            Catalog::from_seed(CatalogSeed::default())?
        }
    });

    let identifiers = Arc::new(RandomIdentifiers::new(
        &settings.identifiers.certificate_prefix,
        settings.identifiers.code_length,
    ));

    // Certificate Issuer Service
    let issuer = CertificateIssuer::new(
        store.clone(),
        identifiers,
        catalog.clone(),
        catalog.clone(),
        settings.identifiers.max_attempts,
    );

    let batch_issuer = BatchIssuer::new(
        issuer.clone(),
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        settings.batch.concurrency,
    );

    // Certificate Verifier Service
    let verifier = Verifier::new(
        store.clone(),
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        &settings.verification.public_base_url,
    );

    let revoker = RevocationService::new(store.clone(), catalog);

    // Initialize API Server with all dependencies
    let api_server = ApiServer::new(
        issuer,
        batch_issuer,
        verifier,
        revoker,
        TokenAuthenticator::new(&settings.auth.jwt_secret),
        store,
    );

    api_server
        .run(settings.server.listen_addr, shutdown_signal())
        .await
        .context("API server failed")?;
    log::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("shutdown signal received");
}
