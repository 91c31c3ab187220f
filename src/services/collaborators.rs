// src/services/collaborators.rs
//! Interfaces to the platform components the certificate services consume but
//! do not own: the course catalog, enrollment, access control and profiles.

use crate::error::CertificateError;
use crate::models::batch::BatchParticipant;
use crate::models::certificate::SubjectRef;
use async_trait::async_trait;

/// Course and batch catalog.
#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    /// Whether certificates may currently be issued for `subject`.
    async fn is_certifiable(&self, subject: &SubjectRef) -> Result<bool, CertificateError>;

    /// Display title of the subject, if the catalog knows it.
    async fn subject_title(&self, subject: &SubjectRef) -> Option<String>;

    /// Full subject reference (course + batch) for a batch id.
    async fn batch_subject(&self, batch_id: &str) -> Result<Option<SubjectRef>, CertificateError>;
}

/// Authorization decisions for authenticated actors.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn can_issue(&self, actor_id: &str, subject: &SubjectRef)
        -> Result<bool, CertificateError>;

    async fn can_revoke(&self, actor_id: &str) -> Result<bool, CertificateError>;
}

/// Enrollment data for course batches.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Every participant of the batch, eligible or not.
    async fn batch_participants(
        &self,
        batch_id: &str,
    ) -> Result<Vec<BatchParticipant>, CertificateError>;
}

/// Holder profiles.
#[async_trait]
pub trait HolderDirectory: Send + Sync {
    async fn display_name(&self, holder_id: &str) -> Option<String>;
}
