// src/services/certificate_issuer.rs
//! Certificate Issuer Service
//!
//! Creates certificates for a holder and a subject (course and/or batch),
//! enforcing that at most one active certificate exists per pair.
//!
//! The pre-check for an existing active certificate only fails fast; the
//! store's uniqueness constraint is what actually closes the race between two
//! concurrent issuers.

use crate::error::CertificateError;
use crate::models::actor::Actor;
use crate::models::certificate::{Certificate, CertificateStatus, SubjectRef};
use crate::services::collaborators::{AccessPolicy, SubjectCatalog};
use crate::storage::{CertificateStore, StoreError, UniqueConstraint};
use crate::utils::crypto::compute_hash;
use crate::utils::identifiers::IdentifierSource;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Default bound on identifier regeneration after uniqueness conflicts.
pub const DEFAULT_MAX_IDENTIFIER_ATTEMPTS: u32 = 5;

/// Input for a single issuance.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub holder_id: String,
    pub subject: SubjectRef,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
impl IssueRequest {
    pub fn new(holder_id: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            holder_id: holder_id.into(),
            subject,
            ..Self::default()
        }
    }
}

/// Service issuing certificates.
///
/// Cheap to clone; all dependencies are shared handles.
#[derive(Clone)]
pub struct CertificateIssuer {
    store: Arc<dyn CertificateStore>,
    identifiers: Arc<dyn IdentifierSource>,
    catalog: Arc<dyn SubjectCatalog>,
    access: Arc<dyn AccessPolicy>,
    max_attempts: u32,
}

impl CertificateIssuer {
    /// Creates a new CertificateIssuer.
    ///
    /// # Arguments
    /// * `store` - Persistence port holding certificates
    /// * `identifiers` - Source of candidate certificate numbers and codes
    /// * `catalog` - Decides whether a subject is certifiable
    /// * `access` - Decides whether an actor may issue for a subject
    /// * `max_attempts` - Bound on identifier regeneration (at least 1)
    pub fn new(
        store: Arc<dyn CertificateStore>,
        identifiers: Arc<dyn IdentifierSource>,
        catalog: Arc<dyn SubjectCatalog>,
        access: Arc<dyn AccessPolicy>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            identifiers,
            catalog,
            access,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Issues a new active certificate.
    ///
    /// # Process Flow
    /// 1. Validates holder and subject, expanding a batch reference to its
    ///    catalog `{course, batch}` form
    /// 2. Checks the actor may issue for the subject
    /// 3. Checks the subject is certifiable
    /// 4. Rejects with `AlreadyIssued` if an active certificate exists
    /// 5. Generates identifiers and the integrity hash, then inserts atomically,
    ///    regenerating identifiers on uniqueness conflicts
    ///
    /// # Errors
    /// `InvalidIssuanceInput`, `Unauthorized`, `SubjectNotCertifiable`,
    /// `AlreadyIssued`, `IdentifierExhausted`, `StoreUnavailable`.
    pub async fn issue(
        &self,
        actor: &Actor,
        request: IssueRequest,
    ) -> Result<Certificate, CertificateError> {
        let holder_id = request.holder_id.trim().to_string();
        if holder_id.is_empty() {
            return Err(CertificateError::InvalidIssuanceInput(
                "holder id must not be empty".into(),
            ));
        }
        let subject = request.subject.normalized();
        if subject.is_empty() {
            return Err(CertificateError::InvalidIssuanceInput(
                "subject must reference a course or a batch".into(),
            ));
        }
        let subject = self.resolve_subject(subject).await?;

        let actor_id = match actor.id() {
            Some(id) => id.to_string(),
            None => return Err(CertificateError::Unauthorized),
        };
        if !self.access.can_issue(&actor_id, &subject).await? {
            log::warn!("{} may not issue certificates for {}", actor, subject);
            return Err(CertificateError::Unauthorized);
        }

        if !self.catalog.is_certifiable(&subject).await? {
            return Err(CertificateError::SubjectNotCertifiable(subject.to_string()));
        }

        if let Some(existing) = self.store.find_active(&holder_id, &subject).await? {
            log::info!(
                "holder {} already holds active certificate {} for {}",
                holder_id,
                existing.certificate_number,
                subject
            );
            return Err(CertificateError::AlreadyIssued {
                existing: existing.identifiers(),
            });
        }

        for attempt in 1..=self.max_attempts {
            let issued_at = Utc::now();
            let certificate = Certificate {
                id: Uuid::new_v4(),
                holder_id: holder_id.clone(),
                subject: subject.clone(),
                certificate_number: self.identifiers.next_certificate_number(),
                verification_code: self
                    .identifiers
                    .next_verification_code(subject.short_code()),
                verification_hash: compute_hash(&holder_id, &subject, issued_at)?,
                status: CertificateStatus::Active,
                issued_at,
                completed_at: request.completed_at,
                issued_by_actor_id: actor_id.clone(),
                revocation: None,
                metadata: request.metadata.clone(),
            };

            match self.store.insert_certificate(certificate.clone()).await {
                Ok(()) => {
                    log::info!(
                        "issued certificate {} ({}) for {} by {}",
                        certificate.certificate_number,
                        certificate.id,
                        subject,
                        actor_id
                    );
                    return Ok(certificate);
                }
                Err(StoreError::Conflict(UniqueConstraint::ActiveHolderSubject)) => {
                    // Lost the race against a concurrent issuer for the same pair.
                    match self.store.find_active(&holder_id, &subject).await? {
                        Some(existing) => {
                            return Err(CertificateError::AlreadyIssued {
                                existing: existing.identifiers(),
                            })
                        }
                        None => log::debug!(
                            "active certificate for {} vanished before lookup, retrying",
                            subject
                        ),
                    }
                }
                Err(StoreError::Conflict(constraint)) => {
                    log::warn!(
                        "{} collision on attempt {}/{}, regenerating identifiers",
                        constraint,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(err) => return Err(CertificateError::StoreUnavailable(err.to_string())),
            }
        }

        log::error!(
            "gave up allocating identifiers for {} after {} attempts",
            subject,
            self.max_attempts
        );
        Err(CertificateError::IdentifierExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Maps every spelling of a batch subject onto the catalog's full form, so
    /// `{batch}` and `{course, batch}` share one active-pair key. A course that
    /// does not own the batch is rejected.
    async fn resolve_subject(&self, subject: SubjectRef) -> Result<SubjectRef, CertificateError> {
        let batch_id = match subject.batch_id.as_deref() {
            Some(batch_id) => batch_id,
            None => return Ok(subject),
        };
        let resolved = match self.catalog.batch_subject(batch_id).await? {
            Some(resolved) => resolved,
            None => return Err(CertificateError::SubjectNotCertifiable(subject.to_string())),
        };
        match (&subject.course_id, &resolved.course_id) {
            (Some(given), Some(owner)) if given != owner => {
                Err(CertificateError::SubjectNotCertifiable(subject.to_string()))
            }
            _ => Ok(resolved),
        }
    }

    /// Full record of a certificate, for actors who may issue for its subject
    /// or revoke certificates.
    pub async fn get_certificate(
        &self,
        actor: &Actor,
        certificate_id: Uuid,
    ) -> Result<Certificate, CertificateError> {
        let actor_id = actor.id().ok_or(CertificateError::Unauthorized)?;
        let certificate = self
            .store
            .get_certificate(certificate_id)
            .await?
            .ok_or(CertificateError::NotFound)?;

        if self.access.can_issue(actor_id, &certificate.subject).await?
            || self.access.can_revoke(actor_id).await?
        {
            Ok(certificate)
        } else {
            Err(CertificateError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{admin, fixture, fixture_with, instructor, ScriptedIdentifiers};
    use crate::storage::CertificateStore;
    use crate::utils::crypto::hash_matches;

    #[tokio::test]
    async fn test_issue_creates_active_certificate() {
        let fx = fixture();
        let mut request = IssueRequest::new("H1", SubjectRef::course("C1"));
        request.metadata.insert("completion".into(), serde_json::json!(100));

        let cert = fx.issuer.issue(&admin(), request).await.unwrap();

        assert_eq!(cert.status, CertificateStatus::Active);
        assert_eq!(cert.holder_id, "H1");
        assert_eq!(cert.issued_by_actor_id, "admin");
        assert!(cert.verification_code.starts_with("C1-"));
        assert!(hash_matches(&cert));
        assert_eq!(
            fx.store.get_certificate(cert.id).await.unwrap(),
            Some(cert.clone())
        );
    }

    #[tokio::test]
    async fn test_second_issue_is_rejected_without_new_row() {
        let fx = fixture();
        let first = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap();

        let err = fx
            .issuer
            .issue(&instructor(), IssueRequest::new(" H1 ", SubjectRef::course("C1")))
            .await
            .unwrap_err();

        match err {
            CertificateError::AlreadyIssued { existing } => {
                assert_eq!(existing, first.identifiers())
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fx.store.stats().await.unwrap().certificates, 1);
    }

    #[tokio::test]
    async fn test_batch_spellings_share_one_active_certificate() {
        let fx = fixture();
        let first = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::batch(None, "B1")))
            .await
            .unwrap();
        assert_eq!(first.subject, SubjectRef::batch(Some("C1".into()), "B1"));

        let err = fx
            .issuer
            .issue(
                &admin(),
                IssueRequest::new("H1", SubjectRef::batch(Some("C1".into()), "B1")),
            )
            .await
            .unwrap_err();
        match err {
            CertificateError::AlreadyIssued { existing } => {
                assert_eq!(existing.certificate_id, first.id)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fx.store.stats().await.unwrap().active, 1);
    }

    #[tokio::test]
    async fn test_rejects_batch_under_foreign_course() {
        let fx = fixture();
        for subject in [
            SubjectRef::batch(Some("C2".into()), "B1"),
            SubjectRef::batch(None, "B-missing"),
        ] {
            let err = fx
                .issuer
                .issue(&admin(), IssueRequest::new("H1", subject))
                .await
                .unwrap_err();
            assert!(matches!(err, CertificateError::SubjectNotCertifiable(_)));
        }
        assert_eq!(fx.store.stats().await.unwrap().certificates, 0);
    }

    #[tokio::test]
    async fn test_concurrent_issue_yields_one_certificate() {
        let fx = fixture();
        let request = IssueRequest::new("H1", SubjectRef::course("C1"));
        let actor = admin();

        let (a, b) = tokio::join!(
            fx.issuer.issue(&actor, request.clone()),
            fx.issuer.issue(&actor, request.clone())
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(CertificateError::AlreadyIssued { .. }))));
        assert_eq!(fx.store.stats().await.unwrap().active, 1);
    }

    #[tokio::test]
    async fn test_store_constraint_backs_up_precheck() {
        let fx = fixture();
        let first = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap();

        // Simulate the check-then-act window: the pre-check sees nothing.
        fx.store.hide_active_once();
        let err = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap_err();

        match err {
            CertificateError::AlreadyIssued { existing } => {
                assert_eq!(existing.certificate_id, first.id)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_regenerates_identifiers_on_collision() {
        let ids = Arc::new(ScriptedIdentifiers::new(
            &["CERT-1", "CERT-1", "CERT-2"],
            &["AAAAA-AAAAA", "BBBBB-BBBBB", "CCCCC-CCCCC"],
        ));
        let fx = fixture_with(ids, 3);

        fx.issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap();
        let second = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H2", SubjectRef::course("C1")))
            .await
            .unwrap();

        assert_eq!(second.certificate_number, "CERT-2");
        assert_eq!(second.verification_code, "CCCCC-CCCCC");
    }

    #[tokio::test]
    async fn test_identifier_exhaustion_is_fatal() {
        let ids = Arc::new(ScriptedIdentifiers::new(&["CERT-1"], &["AAAAA-AAAAA"]));
        let fx = fixture_with(ids, 3);

        fx.issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap();
        let err = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H2", SubjectRef::course("C1")))
            .await
            .unwrap_err();

        assert!(matches!(err, CertificateError::IdentifierExhausted { attempts: 3 }));
        assert_eq!(fx.store.stats().await.unwrap().certificates, 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_unauthorized_and_uncertifiable() {
        let fx = fixture();

        let err = fx
            .issuer
            .issue(&admin(), IssueRequest::new("  ", SubjectRef::course("C1")))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::InvalidIssuanceInput(_)));

        let err = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::InvalidIssuanceInput(_)));

        let err = fx
            .issuer
            .issue(&Actor::Anonymous, IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::Unauthorized));

        let err = fx
            .issuer
            .issue(&Actor::user("stranger"), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::Unauthorized));

        let err = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C2")))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::SubjectNotCertifiable(_)));

        assert_eq!(fx.store.stats().await.unwrap().certificates, 0);
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable() {
        let fx = fixture();
        fx.store.fail_inserts_for("H1");

        let err = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_certificate_requires_privileged_actor() {
        let fx = fixture();
        let cert = fx
            .issuer
            .issue(&admin(), IssueRequest::new("H1", SubjectRef::course("C1")))
            .await
            .unwrap();

        assert_eq!(fx.issuer.get_certificate(&instructor(), cert.id).await.unwrap(), cert);
        assert!(matches!(
            fx.issuer.get_certificate(&Actor::user("H1"), cert.id).await,
            Err(CertificateError::Unauthorized)
        ));
        assert!(matches!(
            fx.issuer.get_certificate(&admin(), Uuid::new_v4()).await,
            Err(CertificateError::NotFound)
        ));
    }
}
