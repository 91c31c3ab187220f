// src/services/revocation.rs
//! Certificate revocation.
//!
//! Revocation is terminal. The status check and the update are a single
//! compare-and-swap in the store, so two concurrent revocations produce exactly
//! one revocation stamp.

use crate::error::CertificateError;
use crate::models::actor::Actor;
use crate::models::certificate::{Certificate, Revocation};
use crate::services::collaborators::AccessPolicy;
use crate::storage::{CertificateStore, RevokeOutcome};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct RevocationService {
    store: Arc<dyn CertificateStore>,
    access: Arc<dyn AccessPolicy>,
}

impl RevocationService {
    pub fn new(store: Arc<dyn CertificateStore>, access: Arc<dyn AccessPolicy>) -> Self {
        Self { store, access }
    }

    /// Revokes an active certificate.
    ///
    /// # Process Flow
    /// 1. Checks the actor may revoke
    /// 2. Requires a non-blank reason
    /// 3. Atomically flips `Active` to `Revoked` and stamps actor, time and reason
    ///
    /// # Errors
    /// `Unauthorized`, `InvalidRevocation`, `NotFound`, `AlreadyRevoked` (the
    /// original stamp is left untouched), `StoreUnavailable`.
    pub async fn revoke(
        &self,
        actor: &Actor,
        certificate_id: Uuid,
        reason: &str,
    ) -> Result<Certificate, CertificateError> {
        let actor_id = actor.id().ok_or(CertificateError::Unauthorized)?;
        if !self.access.can_revoke(actor_id).await? {
            log::warn!("{} may not revoke certificate {}", actor, certificate_id);
            return Err(CertificateError::Unauthorized);
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CertificateError::InvalidRevocation(
                "a revocation reason is required".into(),
            ));
        }

        let revocation = Revocation {
            revoked_at: Utc::now(),
            revoked_by_actor_id: actor_id.to_string(),
            reason: reason.to_string(),
        };

        match self.store.revoke_if_active(certificate_id, revocation).await? {
            RevokeOutcome::Revoked(certificate) => {
                log::info!(
                    "revoked certificate {} ({}) by {}",
                    certificate.certificate_number,
                    certificate.id,
                    actor_id
                );
                Ok(certificate)
            }
            RevokeOutcome::AlreadyRevoked(certificate) => {
                Err(CertificateError::AlreadyRevoked(certificate.id))
            }
            RevokeOutcome::Missing => Err(CertificateError::NotFound),
        }
    }
}
