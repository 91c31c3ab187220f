// src/storage/mod.rs
//! Persistence port for certificates and verification attempts.
//!
//! Services depend on [`CertificateStore`] only; the process entry point picks
//! the implementation and injects it. The store, not the services, is the
//! authority for every uniqueness rule:
//! - certificate ids, numbers and verification codes are unique across all records
//! - at most one `Active` certificate exists per (holder, subject)

pub mod journal;
pub mod memory_store;

use crate::models::certificate::{Certificate, Revocation, SubjectRef};
use crate::models::verification::VerificationAttempt;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Uniqueness rule violated by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    CertificateId,
    CertificateNumber,
    VerificationCode,
    ActiveHolderSubject,
}

impl fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniqueConstraint::CertificateId => "certificate_id",
            UniqueConstraint::CertificateNumber => "certificate_number",
            UniqueConstraint::VerificationCode => "verification_code",
            UniqueConstraint::ActiveHolderSubject => "active_holder_subject",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; nothing was stored.
    #[error("unique constraint violated: {0}")]
    Conflict(UniqueConstraint),

    /// The backend could not be reached or failed to persist; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Persisted data failed validation at the boundary.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result of a compare-and-swap revocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeOutcome {
    /// The certificate was active and is now revoked.
    Revoked(Certificate),
    /// The certificate was already revoked; it is returned untouched.
    AlreadyRevoked(Certificate),
    Missing,
}

/// Record counts reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub certificates: usize,
    pub active: usize,
    pub revoked: usize,
    pub verification_attempts: usize,
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Atomically inserts a new certificate, enforcing every uniqueness rule.
    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StoreError>;

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StoreError>;

    /// Looks up a certificate by its (already normalised) verification code.
    async fn find_by_verification_code(
        &self,
        code: &str,
    ) -> Result<Option<Certificate>, StoreError>;

    /// Returns the active certificate for a holder and subject, if any.
    async fn find_active(
        &self,
        holder_id: &str,
        subject: &SubjectRef,
    ) -> Result<Option<Certificate>, StoreError>;

    /// Transitions an active certificate to revoked, stamping `revocation`.
    ///
    /// The status check and the update happen atomically.
    async fn revoke_if_active(
        &self,
        id: Uuid,
        revocation: Revocation,
    ) -> Result<RevokeOutcome, StoreError>;

    /// Appends a verification attempt. Attempts are never updated or deleted.
    async fn append_attempt(&self, attempt: VerificationAttempt) -> Result<(), StoreError>;

    /// Attempts whose supplied code normalises to `code`, oldest first.
    async fn attempts_for_code(&self, code: &str)
        -> Result<Vec<VerificationAttempt>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
