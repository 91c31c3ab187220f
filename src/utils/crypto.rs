// src/utils/crypto.rs
//! Integrity hashing for certificates.
//!
//! Uses SHA-256 (via `ring`) over an unambiguous encoding of the holder, the
//! subject and the issuance instant.

use crate::error::CertificateError;
use crate::models::certificate::{Certificate, SubjectRef};
use chrono::{DateTime, SecondsFormat, Utc};
use ring::digest::{digest, SHA256};

/// Domain separator so digests from this module never match digests of other data.
const HASH_DOMAIN: &[u8] = b"certify/v1";

/// Computes a SHA-256 digest of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash
///
/// # Returns
/// Fixed-size 32-byte array containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Computes the integrity hash binding a certificate to its holder, subject and
/// issuance instant.
///
/// # Arguments
/// * `holder_id` - Holder the certificate is issued to
/// * `subject` - Course and/or batch being certified
/// * `issued_at` - Issuance instant, hashed with nanosecond precision
///
/// # Returns
/// Lowercase hex encoding of the 32-byte digest.
///
/// # Errors
/// `InvalidIssuanceInput` if the holder or the subject is empty.
///
/// # Encoding
/// Each field is length-prefixed (u64 big-endian) so that no two distinct
/// input triples produce the same byte string. The timestamp is included so a
/// re-issue after revocation never reproduces the old hash.
pub fn compute_hash(
    holder_id: &str,
    subject: &SubjectRef,
    issued_at: DateTime<Utc>,
) -> Result<String, CertificateError> {
    let holder_id = holder_id.trim();
    if holder_id.is_empty() {
        return Err(CertificateError::InvalidIssuanceInput(
            "holder id must not be empty".into(),
        ));
    }
    if subject.is_empty() {
        return Err(CertificateError::InvalidIssuanceInput(
            "subject must reference a course or a batch".into(),
        ));
    }

    let subject = subject.canonical();
    let timestamp = issued_at.to_rfc3339_opts(SecondsFormat::Nanos, true);

    let mut buf = Vec::with_capacity(HASH_DOMAIN.len() + holder_id.len() + subject.len() + 64);
    buf.extend_from_slice(HASH_DOMAIN);
    for field in [holder_id, subject.as_str(), timestamp.as_str()] {
        buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
        buf.extend_from_slice(field.as_bytes());
    }

    Ok(hex::encode(hash_data(&buf)))
}

/// Recomputes a stored certificate's hash and compares it to the recorded one.
pub fn hash_matches(certificate: &Certificate) -> bool {
    compute_hash(
        &certificate.holder_id,
        &certificate.subject,
        certificate.issued_at,
    )
    .map(|hash| hash == certificate.verification_hash)
    .unwrap_or(false)
}
