// src/models/verification.rs
//! Verification outcomes and the append-only attempt log.

use crate::models::certificate::{Certificate, SubjectRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome recorded for a single verification attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttemptResult {
    Verified,
    NotFound,
    Revoked,
}

/// Free-form description of who asked, captured for abuse detection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifierContext {
    /// Origin of the request (e.g. `Origin`/`Referer` header or client address)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Client agent string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// When the verifier made the request
    pub requested_at: DateTime<Utc>,
}

impl VerifierContext {
    pub fn new(origin: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            origin,
            user_agent,
            requested_at: Utc::now(),
        }
    }
}

/// Immutable audit record of one call to the verification service.
///
/// `certificate_id` is `None` when the supplied code did not resolve.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationAttempt {
    pub id: Uuid,
    pub certificate_id: Option<Uuid>,
    pub supplied_code: String,
    pub attempted_at: DateTime<Utc>,
    pub result: AttemptResult,
    pub verifier_context: VerifierContext,
}

/// Public-safe projection of a certificate.
///
/// Never carries the holder id, the issuing actor, or the revocation reason.
/// The restricted form used for revoked certificates also omits the holder's
/// name and completion date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicCertificateView {
    pub certificate_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_name: Option<String>,
    pub subject: SubjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_title: Option<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_hash: Option<String>,
}

impl PublicCertificateView {
    /// Full public view of an active certificate.
    pub fn active(
        certificate: &Certificate,
        holder_name: String,
        subject_title: Option<String>,
    ) -> Self {
        Self {
            certificate_number: certificate.certificate_number.clone(),
            holder_name: Some(holder_name),
            subject: certificate.subject.clone(),
            subject_title,
            issued_at: certificate.issued_at,
            completed_at: certificate.completed_at,
            revoked_at: None,
            verification_hash: Some(certificate.verification_hash.clone()),
        }
    }

    /// Restricted view of a revoked certificate.
    pub fn revoked(certificate: &Certificate, subject_title: Option<String>) -> Self {
        Self {
            certificate_number: certificate.certificate_number.clone(),
            holder_name: None,
            subject: certificate.subject.clone(),
            subject_title,
            issued_at: certificate.issued_at,
            completed_at: None,
            revoked_at: certificate.revocation.as_ref().map(|r| r.revoked_at),
            verification_hash: None,
        }
    }
}

/// Result of verifying a code. Unknown codes are a normal outcome, not an error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VerificationResult {
    Verified(PublicCertificateView),
    NotFound,
    Revoked(PublicCertificateView),
}

impl VerificationResult {
    pub fn attempt_result(&self) -> AttemptResult {
        match self {
            VerificationResult::Verified(_) => AttemptResult::Verified,
            VerificationResult::NotFound => AttemptResult::NotFound,
            VerificationResult::Revoked(_) => AttemptResult::Revoked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_serializes_as_tag_only() {
        let json = serde_json::to_value(VerificationResult::NotFound).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "notFound" }));
    }

    #[test]
    fn test_verified_view_is_flattened_under_tag() {
        let view = PublicCertificateView {
            certificate_number: "CERT-20260101-00000001".into(),
            holder_name: Some("Ada".into()),
            subject: SubjectRef::course("C1"),
            subject_title: None,
            issued_at: Utc::now(),
            completed_at: None,
            revoked_at: None,
            verification_hash: None,
        };
        let json = serde_json::to_value(VerificationResult::Verified(view)).unwrap();
        assert_eq!(json["status"], "verified");
        assert_eq!(json["holderName"], "Ada");
        assert_eq!(json["subject"]["courseId"], "C1");
    }
}
