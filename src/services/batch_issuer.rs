// src/services/batch_issuer.rs
//! Batch issuance: one certificate per eligible participant of a course batch.
//!
//! Participants are issued independently and concurrently. A participant that
//! already holds an active certificate is skipped; any other per-participant
//! error is collected in the summary and never aborts the rest of the batch.

use crate::error::CertificateError;
use crate::models::actor::Actor;
use crate::models::batch::{BatchFailure, BatchIssueSummary, IssuedEntry, SkippedEntry};
use crate::services::certificate_issuer::{CertificateIssuer, IssueRequest};
use crate::services::collaborators::{AccessPolicy, ParticipantDirectory, SubjectCatalog};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default number of participants issued concurrently.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct BatchIssuer {
    issuer: CertificateIssuer,
    catalog: Arc<dyn SubjectCatalog>,
    access: Arc<dyn AccessPolicy>,
    participants: Arc<dyn ParticipantDirectory>,
    concurrency: usize,
}

impl BatchIssuer {
    pub fn new(
        issuer: CertificateIssuer,
        catalog: Arc<dyn SubjectCatalog>,
        access: Arc<dyn AccessPolicy>,
        participants: Arc<dyn ParticipantDirectory>,
        concurrency: usize,
    ) -> Self {
        Self {
            issuer,
            catalog,
            access,
            participants,
            concurrency: concurrency.max(1),
        }
    }

    /// Issues certificates for every eligible participant of `batch_id`.
    ///
    /// The batch must exist and be certifiable, and the actor must be allowed
    /// to issue for it; those checks reject the whole call. After that the
    /// call always returns a summary.
    pub async fn issue_for_batch(
        &self,
        actor: &Actor,
        batch_id: &str,
    ) -> Result<BatchIssueSummary, CertificateError> {
        let batch_id = batch_id.trim();
        if batch_id.is_empty() {
            return Err(CertificateError::InvalidIssuanceInput(
                "batch id must not be empty".into(),
            ));
        }
        let actor_id = actor.id().ok_or(CertificateError::Unauthorized)?;

        let subject = self
            .catalog
            .batch_subject(batch_id)
            .await?
            .ok_or_else(|| CertificateError::SubjectNotCertifiable(format!("batch {}", batch_id)))?;
        if !self.access.can_issue(actor_id, &subject).await? {
            log::warn!("{} may not issue certificates for batch {}", actor, batch_id);
            return Err(CertificateError::Unauthorized);
        }
        if !self.catalog.is_certifiable(&subject).await? {
            return Err(CertificateError::SubjectNotCertifiable(subject.to_string()));
        }

        let eligible: Vec<_> = self
            .participants
            .batch_participants(batch_id)
            .await?
            .into_iter()
            .filter(|participant| participant.status.is_eligible())
            .collect();
        log::info!(
            "issuing batch {} for {} eligible participants",
            batch_id,
            eligible.len()
        );

        let outcomes = stream::iter(eligible)
            .map(|participant| {
                let mut metadata = BTreeMap::new();
                metadata.insert("issuance".to_string(), serde_json::json!("batch"));
                let request = IssueRequest {
                    holder_id: participant.holder_id.clone(),
                    subject: subject.clone(),
                    completed_at: participant.completed_at,
                    metadata,
                };
                async move {
                    let outcome = self.issuer.issue(actor, request).await;
                    (participant.holder_id, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut summary = BatchIssueSummary {
            batch_id: batch_id.to_string(),
            ..BatchIssueSummary::default()
        };
        for (holder_id, outcome) in outcomes {
            match outcome {
                Ok(certificate) => summary.issued.push(IssuedEntry {
                    holder_id,
                    certificate_id: certificate.id,
                    certificate_number: certificate.certificate_number,
                }),
                Err(CertificateError::AlreadyIssued { existing }) => {
                    summary.skipped.push(SkippedEntry { holder_id, existing })
                }
                Err(err) => {
                    log::warn!("batch {}: issuing for {} failed: {}", batch_id, holder_id, err);
                    summary.failures.push(BatchFailure {
                        holder_id,
                        code: err.code().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        summary.issued.sort_by(|a, b| a.holder_id.cmp(&b.holder_id));
        summary.skipped.sort_by(|a, b| a.holder_id.cmp(&b.holder_id));
        summary.failures.sort_by(|a, b| a.holder_id.cmp(&b.holder_id));
        summary.issued_count = summary.issued.len();

        log::info!(
            "batch {} done: {} issued, {} skipped, {} failed",
            batch_id,
            summary.issued_count,
            summary.skipped.len(),
            summary.failures.len()
        );
        Ok(summary)
    }
}
