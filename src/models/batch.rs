// src/models/batch.rs
//! Batch participants (owned by the enrollment catalog) and batch issuance summaries.

use crate::models::certificate::CertificateIdentifiers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of a participant within a course batch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantStatus {
    Enrolled,
    InProgress,
    Completed,
    Dropped,
}

impl ParticipantStatus {
    /// Only participants who completed the batch qualify for a certificate.
    pub fn is_eligible(self) -> bool {
        matches!(self, ParticipantStatus::Completed)
    }
}

/// A holder enrolled in a course batch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchParticipant {
    pub holder_id: String,
    pub status: ParticipantStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedEntry {
    pub holder_id: String,
    pub certificate_id: Uuid,
    pub certificate_number: String,
}

/// Participant skipped because an active certificate already exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    pub holder_id: String,
    pub existing: CertificateIdentifiers,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub holder_id: String,
    /// Stable error code, e.g. `store_unavailable`
    pub code: String,
    pub error: String,
}

/// Aggregated outcome of issuing certificates for one batch.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchIssueSummary {
    pub batch_id: String,
    pub issued_count: usize,
    pub issued: Vec<IssuedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub failures: Vec<BatchFailure>,
}
