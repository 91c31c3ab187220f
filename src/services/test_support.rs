// src/services/test_support.rs
//! Shared fixtures for service tests.

use crate::models::actor::Actor;
use crate::models::certificate::{Certificate, Revocation, SubjectRef};
use crate::models::verification::{VerificationAttempt, VerifierContext};
use crate::services::batch_issuer::BatchIssuer;
use crate::services::catalog::Catalog;
use crate::services::certificate_issuer::CertificateIssuer;
use crate::services::revocation::RevocationService;
use crate::services::verifier::Verifier;
use crate::storage::memory_store::MemoryCertificateStore;
use crate::storage::{CertificateStore, RevokeOutcome, StoreError, StoreStats};
use crate::utils::identifiers::{IdentifierSource, RandomIdentifiers};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const SEED: &str = r#"{
    "administrators": ["admin"],
    "courses": [
        { "id": "C1", "title": "Intro to Rust", "instructors": ["instructor-1"] },
        { "id": "C2", "title": "Archived", "certifiable": false }
    ],
    "batches": [
        { "id": "B1", "courseId": "C1", "title": "Spring 2026",
          "participants": [
            { "holderId": "P1", "status": "completed", "completedAt": "2026-05-01T10:00:00Z" },
            { "holderId": "P2", "status": "completed", "completedAt": "2026-05-01T10:00:00Z" },
            { "holderId": "P3", "status": "completed", "completedAt": "2026-05-02T10:00:00Z" },
            { "holderId": "P4", "status": "completed", "completedAt": "2026-05-02T10:00:00Z" },
            { "holderId": "P5", "status": "completed", "completedAt": "2026-05-03T10:00:00Z" },
            { "holderId": "P6", "status": "enrolled" },
            { "holderId": "P7", "status": "dropped" }
          ] },
        { "id": "B2", "courseId": "C1", "title": "Fall 2026", "certifiable": false }
    ],
    "holders": [
        { "id": "H1", "displayName": "Ada Lovelace" },
        { "id": "P1", "displayName": "Grace Hopper" }
    ]
}"#;

pub const PUBLIC_BASE_URL: &str = "https://learn.example.com";

pub fn admin() -> Actor {
    Actor::user("admin")
}

pub fn instructor() -> Actor {
    Actor::user("instructor-1")
}

pub fn context() -> VerifierContext {
    VerifierContext::new(
        Some("https://employer.example".into()),
        Some("test-agent".into()),
    )
}

pub fn catalog() -> Catalog {
    Catalog::from_seed(serde_json::from_str(SEED).unwrap()).unwrap()
}

pub struct Fixture {
    pub store: Arc<FaultyStore>,
    pub issuer: CertificateIssuer,
    pub batch: BatchIssuer,
    pub verifier: Verifier,
    pub revoker: RevocationService,
}

pub fn fixture() -> Fixture {
    fixture_with(Arc::new(RandomIdentifiers::default()), 5)
}

pub fn fixture_with(identifiers: Arc<dyn IdentifierSource>, max_attempts: u32) -> Fixture {
    let store = Arc::new(FaultyStore::default());
    let catalog = Arc::new(catalog());
    let dyn_store: Arc<dyn CertificateStore> = store.clone();

    let issuer = CertificateIssuer::new(
        dyn_store.clone(),
        identifiers,
        catalog.clone(),
        catalog.clone(),
        max_attempts,
    );
    let batch = BatchIssuer::new(
        issuer.clone(),
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        4,
    );
    let verifier = Verifier::new(
        dyn_store.clone(),
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        PUBLIC_BASE_URL,
    );
    let revoker = RevocationService::new(dyn_store, catalog);

    Fixture {
        store,
        issuer,
        batch,
        verifier,
        revoker,
    }
}

/// Hands out pre-scripted identifiers; the last value repeats once a queue runs dry.
pub struct ScriptedIdentifiers {
    numbers: Mutex<VecDeque<String>>,
    codes: Mutex<VecDeque<String>>,
}

impl ScriptedIdentifiers {
    pub fn new(numbers: &[&str], codes: &[&str]) -> Self {
        Self {
            numbers: Mutex::new(numbers.iter().map(|s| s.to_string()).collect()),
            codes: Mutex::new(codes.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn next(queue: &Mutex<VecDeque<String>>) -> String {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

impl IdentifierSource for ScriptedIdentifiers {
    fn next_certificate_number(&self) -> String {
        Self::next(&self.numbers)
    }

    fn next_verification_code(&self, _subject_hint: Option<&str>) -> String {
        Self::next(&self.codes)
    }
}

/// Memory store with injectable faults.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryCertificateStore,
    failing_holders: Mutex<HashSet<String>>,
    hide_active: AtomicBool,
}

impl FaultyStore {
    /// Inserts for `holder_id` fail as if the backend were down.
    pub fn fail_inserts_for(&self, holder_id: &str) {
        self.failing_holders
            .lock()
            .unwrap()
            .insert(holder_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_holders.lock().unwrap().clear();
    }

    /// The next `find_active` reports nothing, opening the check-then-insert window.
    pub fn hide_active_once(&self) {
        self.hide_active.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CertificateStore for FaultyStore {
    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StoreError> {
        if self
            .failing_holders
            .lock()
            .unwrap()
            .contains(&certificate.holder_id)
        {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.inner.insert_certificate(certificate).await
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StoreError> {
        self.inner.get_certificate(id).await
    }

    async fn find_by_verification_code(
        &self,
        code: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        self.inner.find_by_verification_code(code).await
    }

    async fn find_active(
        &self,
        holder_id: &str,
        subject: &SubjectRef,
    ) -> Result<Option<Certificate>, StoreError> {
        if self.hide_active.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_active(holder_id, subject).await
    }

    async fn revoke_if_active(
        &self,
        id: Uuid,
        revocation: Revocation,
    ) -> Result<RevokeOutcome, StoreError> {
        self.inner.revoke_if_active(id, revocation).await
    }

    async fn append_attempt(&self, attempt: VerificationAttempt) -> Result<(), StoreError> {
        self.inner.append_attempt(attempt).await
    }

    async fn attempts_for_code(
        &self,
        code: &str,
    ) -> Result<Vec<VerificationAttempt>, StoreError> {
        self.inner.attempts_for_code(code).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}
