// src/error.rs
//! Error taxonomy of the certificate services and its HTTP mapping.

use crate::models::certificate::CertificateIdentifiers;
use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by issuance, batch issuance, verification and revocation.
///
/// Only [`CertificateError::StoreUnavailable`] is worth retrying; everything
/// else is a definitive answer for the given input.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("invalid issuance input: {0}")]
    InvalidIssuanceInput(String),

    #[error("subject {0} is not certifiable")]
    SubjectNotCertifiable(String),

    #[error("an active certificate already exists: {existing}")]
    AlreadyIssued { existing: CertificateIdentifiers },

    #[error("could not allocate unique certificate identifiers after {attempts} attempts")]
    IdentifierExhausted { attempts: u32 },

    #[error("unauthorized")]
    Unauthorized,

    #[error("certificate not found")]
    NotFound,

    #[error("certificate {0} is already revoked")]
    AlreadyRevoked(Uuid),

    #[error("invalid revocation: {0}")]
    InvalidRevocation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CertificateError {
    /// Stable machine-readable code used in API bodies and batch summaries.
    pub fn code(&self) -> &'static str {
        match self {
            CertificateError::InvalidIssuanceInput(_) => "invalid_issuance_input",
            CertificateError::SubjectNotCertifiable(_) => "subject_not_certifiable",
            CertificateError::AlreadyIssued { .. } => "already_issued",
            CertificateError::IdentifierExhausted { .. } => "identifier_exhausted",
            CertificateError::Unauthorized => "unauthorized",
            CertificateError::NotFound => "not_found",
            CertificateError::AlreadyRevoked(_) => "already_revoked",
            CertificateError::InvalidRevocation(_) => "invalid_revocation",
            CertificateError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CertificateError::StoreUnavailable(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            CertificateError::InvalidIssuanceInput(_) | CertificateError::InvalidRevocation(_) => {
                StatusCode::BAD_REQUEST
            }
            CertificateError::SubjectNotCertifiable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CertificateError::AlreadyIssued { .. } | CertificateError::AlreadyRevoked(_) => {
                StatusCode::CONFLICT
            }
            CertificateError::IdentifierExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CertificateError::Unauthorized => StatusCode::UNAUTHORIZED,
            CertificateError::NotFound => StatusCode::NOT_FOUND,
            CertificateError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Store failures reaching a service outside the issuance write path.
///
/// The issuance path inspects [`StoreError::Conflict`] itself; anywhere else a
/// conflict means the backend misbehaved and is reported as unavailable.
impl From<StoreError> for CertificateError {
    fn from(err: StoreError) -> Self {
        CertificateError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for CertificateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        match &self {
            CertificateError::AlreadyIssued { existing } => {
                body["existing"] = json!(existing);
            }
            CertificateError::StoreUnavailable(detail) => {
                log::warn!("store unavailable while serving request: {}", detail);
                body["error"] = json!("store unavailable, retry later");
            }
            _ => {}
        }
        if self.is_retryable() {
            body["retryable"] = json!(true);
        }
        (status, Json(body)).into_response()
    }
}
