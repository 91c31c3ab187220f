// src/storage/memory_store.rs
//! In-process certificate store.
//!
//! Keeps certificates and verification attempts in hash maps guarded by a
//! single async mutex, so every constraint check and the write it guards happen
//! atomically. An optional [`Journal`] makes the state durable across restarts.

use crate::models::certificate::{Certificate, CertificateStatus, Revocation, SubjectRef};
use crate::models::verification::VerificationAttempt;
use crate::storage::journal::{Journal, Record};
use crate::storage::{CertificateStore, RevokeOutcome, StoreError, StoreStats, UniqueConstraint};
use crate::utils::identifiers::normalize_code;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

/// (holder id, canonical subject)
type PairKey = (String, String);

fn pair_key(holder_id: &str, subject: &SubjectRef) -> PairKey {
    (holder_id.to_string(), subject.canonical())
}

/// Indexed in-memory records.
#[derive(Default)]
struct StoreState {
    certificates: HashMap<Uuid, Certificate>,
    by_number: HashMap<String, Uuid>,
    by_code: HashMap<String, Uuid>,
    active: HashMap<PairKey, Uuid>,
    attempts: Vec<VerificationAttempt>,
}

impl StoreState {
    fn check_insert(&self, certificate: &Certificate) -> Result<(), StoreError> {
        if self.certificates.contains_key(&certificate.id) {
            return Err(StoreError::Conflict(UniqueConstraint::CertificateId));
        }
        if self.by_number.contains_key(&certificate.certificate_number) {
            return Err(StoreError::Conflict(UniqueConstraint::CertificateNumber));
        }
        if self
            .by_code
            .contains_key(&normalize_code(&certificate.verification_code))
        {
            return Err(StoreError::Conflict(UniqueConstraint::VerificationCode));
        }
        if certificate.is_active()
            && self
                .active
                .contains_key(&pair_key(&certificate.holder_id, &certificate.subject))
        {
            return Err(StoreError::Conflict(UniqueConstraint::ActiveHolderSubject));
        }
        Ok(())
    }

    /// Inserts or replaces a certificate and keeps every index in step.
    fn apply_certificate(&mut self, certificate: Certificate) {
        let key = pair_key(&certificate.holder_id, &certificate.subject);
        if let Some(previous) = self.certificates.get(&certificate.id) {
            let previous_key = pair_key(&previous.holder_id, &previous.subject);
            if self.active.get(&previous_key) == Some(&previous.id) {
                self.active.remove(&previous_key);
            }
        }

        self.by_number
            .insert(certificate.certificate_number.clone(), certificate.id);
        self.by_code
            .insert(normalize_code(&certificate.verification_code), certificate.id);
        if certificate.is_active() {
            self.active.insert(key, certificate.id);
        }
        self.certificates.insert(certificate.id, certificate);
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::Certificate(certificate) => self.apply_certificate(certificate),
            Record::VerificationAttempt(attempt) => self.attempts.push(attempt),
        }
    }
}

struct Inner {
    state: StoreState,
    journal: Option<Journal>,
}

impl Inner {
    async fn persist(&mut self, record: &Record) -> Result<(), StoreError> {
        match self.journal.as_mut() {
            Some(journal) => journal.append(record).await,
            None => Ok(()),
        }
    }
}

/// Certificate store held in process memory.
pub struct MemoryCertificateStore {
    inner: Mutex<Inner>,
}

impl MemoryCertificateStore {
    /// Creates an empty, non-durable store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: StoreState::default(),
                journal: None,
            }),
        }
    }

    /// Creates a store backed by the journal at `path`, replaying its records.
    ///
    /// # Errors
    /// Fails if the journal cannot be opened or contains an invalid record, or
    /// if replayed certificates violate a uniqueness rule.
    pub async fn with_journal(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (journal, records) = Journal::open(path).await?;
        let mut state = StoreState::default();
        for record in records {
            if let Record::Certificate(certificate) = &record {
                if !state.certificates.contains_key(&certificate.id) {
                    state.check_insert(certificate).map_err(|e| {
                        StoreError::Corrupt(format!("replaying {}: {}", certificate.id, e))
                    })?;
                }
            }
            state.apply(record);
        }
        log::info!(
            "replayed {} certificates and {} verification attempts",
            state.certificates.len(),
            state.attempts.len()
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                journal: Some(journal),
            }),
        })
    }
}

impl Default for MemoryCertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        inner.state.check_insert(&certificate)?;
        let record = Record::Certificate(certificate);
        inner.persist(&record).await?;
        inner.state.apply(record);
        Ok(())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard.state.certificates.get(&id).cloned())
    }

    async fn find_by_verification_code(
        &self,
        code: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let guard = self.inner.lock().await;
        let state = &guard.state;
        Ok(state
            .by_code
            .get(&normalize_code(code))
            .and_then(|id| state.certificates.get(id))
            .cloned())
    }

    async fn find_active(
        &self,
        holder_id: &str,
        subject: &SubjectRef,
    ) -> Result<Option<Certificate>, StoreError> {
        let guard = self.inner.lock().await;
        let state = &guard.state;
        Ok(state
            .active
            .get(&pair_key(holder_id, subject))
            .and_then(|id| state.certificates.get(id))
            .cloned())
    }

    async fn revoke_if_active(
        &self,
        id: Uuid,
        revocation: Revocation,
    ) -> Result<RevokeOutcome, StoreError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let current = match inner.state.certificates.get(&id) {
            Some(certificate) => certificate.clone(),
            None => return Ok(RevokeOutcome::Missing),
        };
        if current.status == CertificateStatus::Revoked {
            return Ok(RevokeOutcome::AlreadyRevoked(current));
        }

        let mut updated = current;
        updated.status = CertificateStatus::Revoked;
        updated.revocation = Some(revocation);

        inner.persist(&Record::Certificate(updated.clone())).await?;
        inner.state.apply_certificate(updated.clone());
        Ok(RevokeOutcome::Revoked(updated))
    }

    async fn append_attempt(&self, attempt: VerificationAttempt) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let record = Record::VerificationAttempt(attempt);
        inner.persist(&record).await?;
        inner.state.apply(record);
        Ok(())
    }

    async fn attempts_for_code(
        &self,
        code: &str,
    ) -> Result<Vec<VerificationAttempt>, StoreError> {
        let code = normalize_code(code);
        let guard = self.inner.lock().await;
        Ok(guard
            .state
            .attempts
            .iter()
            .filter(|attempt| normalize_code(&attempt.supplied_code) == code)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let guard = self.inner.lock().await;
        let state = &guard.state;
        let active = state.active.len();
        Ok(StoreStats {
            certificates: state.certificates.len(),
            active,
            revoked: state.certificates.len() - active,
            verification_attempts: state.attempts.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::verification::{AttemptResult, VerifierContext};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn certificate(holder: &str, course: &str, number: &str, code: &str) -> Certificate {
        Certificate {
            id: Uuid::new_v4(),
            holder_id: holder.into(),
            subject: SubjectRef::course(course),
            certificate_number: number.into(),
            verification_code: code.into(),
            verification_hash: "ab".repeat(32),
            status: CertificateStatus::Active,
            issued_at: Utc::now(),
            completed_at: None,
            issued_by_actor_id: "admin".into(),
            revocation: None,
            metadata: BTreeMap::new(),
        }
    }

    fn revocation() -> Revocation {
        Revocation {
            revoked_at: Utc::now(),
            revoked_by_actor_id: "admin".into(),
            reason: "policy violation".into(),
        }
    }

    fn attempt(code: &str) -> VerificationAttempt {
        VerificationAttempt {
            id: Uuid::new_v4(),
            certificate_id: None,
            supplied_code: code.into(),
            attempted_at: Utc::now(),
            result: AttemptResult::NotFound,
            verifier_context: VerifierContext::new(None, None),
        }
    }

    fn temp_journal() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("certify-test-{}", Uuid::new_v4()))
            .join("journal.jsonl")
    }

    #[tokio::test]
    async fn test_number_and_code_are_unique() {
        let store = MemoryCertificateStore::new();
        store
            .insert_certificate(certificate("H1", "C1", "N-1", "AAAAA-BBBBB"))
            .await
            .unwrap();

        let err = store
            .insert_certificate(certificate("H2", "C1", "N-1", "CCCCC-DDDDD"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueConstraint::CertificateNumber)));

        let err = store
            .insert_certificate(certificate("H2", "C1", "N-2", "aaaaa-bbbbb"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueConstraint::VerificationCode)));
        assert_eq!(store.stats().await.unwrap().certificates, 1);
    }

    #[tokio::test]
    async fn test_one_active_per_pair_until_revoked() {
        let store = MemoryCertificateStore::new();
        let first = certificate("H1", "C1", "N-1", "AAAAA-BBBBB");
        store.insert_certificate(first.clone()).await.unwrap();

        let err = store
            .insert_certificate(certificate("H1", "C1", "N-2", "CCCCC-DDDDD"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueConstraint::ActiveHolderSubject)));

        let outcome = store.revoke_if_active(first.id, revocation()).await.unwrap();
        assert!(matches!(outcome, RevokeOutcome::Revoked(_)));
        assert!(store
            .find_active("H1", &SubjectRef::course("C1"))
            .await
            .unwrap()
            .is_none());

        store
            .insert_certificate(certificate("H1", "C1", "N-2", "CCCCC-DDDDD"))
            .await
            .unwrap();

        // The revoked record keeps its number and code reserved.
        let err = store
            .insert_certificate(certificate("H9", "C9", "N-1", "EEEEE-FFFFF"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueConstraint::CertificateNumber)));
    }

    #[tokio::test]
    async fn test_revoke_is_compare_and_swap() {
        let store = MemoryCertificateStore::new();
        let cert = certificate("H1", "C1", "N-1", "AAAAA-BBBBB");
        store.insert_certificate(cert.clone()).await.unwrap();

        let first = match store.revoke_if_active(cert.id, revocation()).await.unwrap() {
            RevokeOutcome::Revoked(c) => c,
            other => panic!("unexpected {:?}", other),
        };

        let mut second_stamp = revocation();
        second_stamp.reason = "again".into();
        match store.revoke_if_active(cert.id, second_stamp).await.unwrap() {
            RevokeOutcome::AlreadyRevoked(c) => assert_eq!(c.revocation, first.revocation),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            store.revoke_if_active(Uuid::new_v4(), revocation()).await.unwrap(),
            RevokeOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_attempts_matched_case_insensitively() {
        let store = MemoryCertificateStore::new();
        store.append_attempt(attempt("abcde-fghjk")).await.unwrap();
        store.append_attempt(attempt(" ABCDE-FGHJK ")).await.unwrap();
        store.append_attempt(attempt("ZZZZZ-ZZZZZ")).await.unwrap();

        assert_eq!(store.attempts_for_code("ABCDE-FGHJK").await.unwrap().len(), 2);
        assert_eq!(store.stats().await.unwrap().verification_attempts, 3);
    }

    #[tokio::test]
    async fn test_journal_replay_restores_state() {
        let path = temp_journal();
        let cert = certificate("H1", "C1", "N-1", "AAAAA-BBBBB");
        {
            let store = MemoryCertificateStore::with_journal(&path).await.unwrap();
            store.insert_certificate(cert.clone()).await.unwrap();
            store.revoke_if_active(cert.id, revocation()).await.unwrap();
            store.append_attempt(attempt("AAAAA-BBBBB")).await.unwrap();
        }

        let store = MemoryCertificateStore::with_journal(&path).await.unwrap();
        let restored = store.get_certificate(cert.id).await.unwrap().unwrap();
        assert_eq!(restored.status, CertificateStatus::Revoked);
        assert_eq!(
            store.stats().await.unwrap(),
            StoreStats {
                certificates: 1,
                active: 0,
                revoked: 1,
                verification_attempts: 1,
            }
        );

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_journal_rejects_corrupt_lines() {
        let path = temp_journal();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"type\":\"certificate\",\"record\":42}\n").unwrap();

        let err = MemoryCertificateStore::with_journal(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::Corrupt(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
