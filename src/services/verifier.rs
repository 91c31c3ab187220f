// src/services/verifier.rs
//! Public certificate verification.
//!
//! Resolves a verification code to a public-safe view of the certificate and
//! records one [`VerificationAttempt`] for every call, whatever the outcome.
//! Unknown codes are a normal `NotFound` result so the public endpoint behaves
//! the same for typos and for codes that were never issued.

use crate::error::CertificateError;
use crate::models::actor::Actor;
use crate::models::verification::{
    PublicCertificateView, VerificationAttempt, VerificationResult, VerifierContext,
};
use crate::services::collaborators::{AccessPolicy, HolderDirectory, SubjectCatalog};
use crate::storage::CertificateStore;
use crate::utils::crypto::hash_matches;
use crate::utils::identifiers::normalize_code;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Longest prefix of a supplied code kept in the attempt log.
pub const MAX_SUPPLIED_CODE_LEN: usize = 64;

/// Certificate verifier backed by the certificate store.
///
/// Never mutates a certificate; its only write is the attempt log.
#[derive(Clone)]
pub struct Verifier {
    store: Arc<dyn CertificateStore>,
    catalog: Arc<dyn SubjectCatalog>,
    holders: Arc<dyn HolderDirectory>,
    access: Arc<dyn AccessPolicy>,
    /// Base URL of the public verification endpoint, without trailing slash
    public_base_url: String,
}

impl Verifier {
    /// Constructs a new Verifier.
    ///
    /// # Arguments
    /// * `store` - Persistence port holding certificates and attempts
    /// * `catalog` - Resolves subject titles for the public view
    /// * `holders` - Resolves holder display names for the public view
    /// * `access` - Decides who may read the attempt log
    /// * `public_base_url` - e.g. `https://learn.example.com`
    pub fn new(
        store: Arc<dyn CertificateStore>,
        catalog: Arc<dyn SubjectCatalog>,
        holders: Arc<dyn HolderDirectory>,
        access: Arc<dyn AccessPolicy>,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            catalog,
            holders,
            access,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Shareable verification link for a code; this is also the QR payload.
    pub fn verification_url(&self, code: &str) -> String {
        format!("{}/verify?code={}", self.public_base_url, normalize_code(code))
    }

    /// Verifies a supplied code.
    ///
    /// # Process Flow
    /// 1. Normalises the code (trim, uppercase)
    /// 2. Looks it up in the store
    /// 3. Builds the full view for active certificates, the restricted view for revoked ones
    /// 4. Appends exactly one attempt recording the outcome, with the supplied
    ///    code cut to [`MAX_SUPPLIED_CODE_LEN`] characters
    ///
    /// # Errors
    /// Only `StoreUnavailable`, when the lookup or the attempt write fails. A
    /// result is never returned without its attempt having been recorded.
    pub async fn verify(
        &self,
        supplied_code: &str,
        context: VerifierContext,
    ) -> Result<VerificationResult, CertificateError> {
        let code = normalize_code(supplied_code);
        let found = if code.is_empty() {
            None
        } else {
            self.store.find_by_verification_code(&code).await?
        };

        let (certificate_id, result) = match found {
            None => (None, VerificationResult::NotFound),
            Some(certificate) => {
                let subject_title = self.catalog.subject_title(&certificate.subject).await;
                if certificate.is_active() {
                    if !hash_matches(&certificate) {
                        log::warn!(
                            "integrity hash mismatch for certificate {}",
                            certificate.id
                        );
                    }
                    let holder_name = self
                        .holders
                        .display_name(&certificate.holder_id)
                        .await
                        .unwrap_or_else(|| certificate.holder_id.clone());
                    (
                        Some(certificate.id),
                        VerificationResult::Verified(PublicCertificateView::active(
                            &certificate,
                            holder_name,
                            subject_title,
                        )),
                    )
                } else {
                    (
                        Some(certificate.id),
                        VerificationResult::Revoked(PublicCertificateView::revoked(
                            &certificate,
                            subject_title,
                        )),
                    )
                }
            }
        };

        let attempt = VerificationAttempt {
            id: Uuid::new_v4(),
            certificate_id,
            supplied_code: supplied_code.chars().take(MAX_SUPPLIED_CODE_LEN).collect(),
            attempted_at: Utc::now(),
            result: result.attempt_result(),
            verifier_context: context,
        };
        self.store.append_attempt(attempt).await?;

        log::info!("verification of {:?}: {:?}", code, result.attempt_result());
        Ok(result)
    }

    /// Attempt log for a code, for actors allowed to revoke certificates.
    pub async fn attempts_for_code(
        &self,
        actor: &Actor,
        code: &str,
    ) -> Result<Vec<VerificationAttempt>, CertificateError> {
        let actor_id = actor.id().ok_or(CertificateError::Unauthorized)?;
        if !self.access.can_revoke(actor_id).await? {
            return Err(CertificateError::Unauthorized);
        }
        Ok(self.store.attempts_for_code(code).await?)
    }
}
