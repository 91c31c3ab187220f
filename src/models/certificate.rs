// src/models/certificate.rs
//! Certificate data model.
//!
//! A certificate is the platform's proof that a holder completed a course or a
//! course batch. Records are created once by issuance, mutated only by
//! revocation and never physically deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Reference to the course and/or course batch a certificate attests.
///
/// At least one of the two identifiers must be present for the reference to be
/// certifiable. Blank identifiers are treated as absent (see [`SubjectRef::normalized`]).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRef {
    /// Course identifier, e.g. "RUST-101"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,

    /// Course batch identifier, e.g. "RUST-101-2026-SPRING"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl SubjectRef {
    /// Subject reference for a whole course.
    #[cfg(test)]
    pub fn course(course_id: impl Into<String>) -> Self {
        Self {
            course_id: Some(course_id.into()),
            batch_id: None,
        }
    }

    /// Subject reference for a batch, optionally tied to its parent course.
    pub fn batch(course_id: Option<String>, batch_id: impl Into<String>) -> Self {
        Self {
            course_id,
            batch_id: Some(batch_id.into()),
        }
    }

    /// Returns a copy with identifiers trimmed and blank ones dropped.
    pub fn normalized(&self) -> Self {
        fn clean(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            course_id: clean(&self.course_id),
            batch_id: clean(&self.batch_id),
        }
    }

    /// True when neither a course nor a batch is referenced.
    pub fn is_empty(&self) -> bool {
        let normalized = self.normalized();
        normalized.course_id.is_none() && normalized.batch_id.is_none()
    }

    /// Stable textual form used for hashing and uniqueness keys.
    ///
    /// Encoded as a JSON pair so ids containing separators cannot alias one
    /// another, e.g. `["A",null]` versus `[null,"A"]`.
    pub fn canonical(&self) -> String {
        let normalized = self.normalized();
        serde_json::json!([normalized.course_id, normalized.batch_id]).to_string()
    }

    /// Short human-readable code for the subject, preferring the course.
    pub fn short_code(&self) -> Option<&str> {
        self.course_id
            .as_deref()
            .or(self.batch_id.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let normalized = self.normalized();
        write!(
            f,
            "course={};batch={}",
            normalized.course_id.as_deref().unwrap_or("-"),
            normalized.batch_id.as_deref().unwrap_or("-"),
        )
    }
}

/// Lifecycle state of a certificate. `Revoked` is terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateStatus::Active => f.write_str("active"),
            CertificateStatus::Revoked => f.write_str("revoked"),
        }
    }
}

/// Revocation stamp, present only on revoked certificates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Revocation {
    pub revoked_at: DateTime<Utc>,
    pub revoked_by_actor_id: String,
    pub reason: String,
}

/// An issued certificate.
///
/// # Fields
/// - `id`: opaque identifier assigned at creation
/// - `holder_id`: the person the certificate is issued to
/// - `subject`: course and/or batch being certified
/// - `certificate_number`: human-readable serial, globally unique
/// - `verification_code`: public lookup token, globally unique and stored uppercase
/// - `verification_hash`: hex SHA-256 binding holder, subject and `issued_at`
/// - `status` / `revocation`: lifecycle state and its stamp
/// - `metadata`: non-authoritative context, ignored by hashing and uniqueness
///
/// # Invariants
/// - `revocation.is_some()` exactly when `status == Revoked`
/// - `id`, `issued_at`, `certificate_number`, `verification_code` never change
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub holder_id: String,
    pub subject: SubjectRef,
    pub certificate_number: String,
    pub verification_code: String,
    pub verification_hash: String,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub issued_by_actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Certificate {
    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }

    /// Identifiers that may be disclosed to a caller in conflict responses.
    pub fn identifiers(&self) -> CertificateIdentifiers {
        CertificateIdentifiers {
            certificate_id: self.id,
            certificate_number: self.certificate_number.clone(),
            verification_code: self.verification_code.clone(),
        }
    }

    /// Checks the record's internal consistency.
    ///
    /// Used when records cross the persistence boundary; a record failing this
    /// check is rejected rather than handed to the services.
    pub fn validate(&self) -> Result<(), String> {
        if self.holder_id.trim().is_empty() {
            return Err(format!("certificate {} has an empty holder", self.id));
        }
        if self.subject.is_empty() {
            return Err(format!("certificate {} has an empty subject", self.id));
        }
        if self.certificate_number.is_empty() || self.verification_code.is_empty() {
            return Err(format!("certificate {} is missing identifiers", self.id));
        }
        match (self.status, self.revocation.is_some()) {
            (CertificateStatus::Active, false) | (CertificateStatus::Revoked, true) => Ok(()),
            (status, _) => Err(format!(
                "certificate {} has status {} inconsistent with its revocation stamp",
                self.id, status
            )),
        }
    }
}

/// Public identifiers of an existing certificate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateIdentifiers {
    pub certificate_id: Uuid,
    pub certificate_number: String,
    pub verification_code: String,
}

impl fmt::Display for CertificateIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.certificate_number, self.certificate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_distinguishes_course_and_batch() {
        let course = SubjectRef::course("A");
        let batch = SubjectRef::batch(None, "A");
        assert_ne!(course.canonical(), batch.canonical());
        assert_eq!(course.canonical(), r#"["A",null]"#);
        assert_eq!(course.to_string(), "course=A;batch=-");
    }

    #[test]
    fn test_canonical_survives_separators_in_ids() {
        let spliced = SubjectRef::course("A;batch=B");
        let split = SubjectRef::batch(Some("A".into()), "B;batch=-");
        assert_eq!(spliced.to_string(), split.to_string());
        assert_ne!(spliced.canonical(), split.canonical());
    }

    #[test]
    fn test_normalized_drops_blank_ids() {
        let subject = SubjectRef {
            course_id: Some("  C1 ".into()),
            batch_id: Some("   ".into()),
        };
        assert_eq!(subject.normalized(), SubjectRef::course("C1"));
        assert!(!subject.is_empty());
        assert!(SubjectRef::default().is_empty());
    }

    #[test]
    fn test_short_code_prefers_course() {
        let subject = SubjectRef::batch(Some("C1".into()), "B7");
        assert_eq!(subject.short_code(), Some("C1"));
        assert_eq!(SubjectRef::batch(None, "B7").short_code(), Some("B7"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&CertificateStatus::Revoked).unwrap();
        assert_eq!(json, "\"revoked\"");
    }
}
