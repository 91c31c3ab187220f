// src/services/catalog.rs
//! In-process catalog loaded from a JSON seed file.
//!
//! Stands in for the platform's course, enrollment and profile backends and
//! implements every collaborator interface the certificate services consume.
//! The data is read once at start-up and never mutated.

use crate::error::CertificateError;
use crate::models::batch::BatchParticipant;
use crate::models::certificate::SubjectRef;
use crate::services::collaborators::{
    AccessPolicy, HolderDirectory, ParticipantDirectory, SubjectCatalog,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog seed {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid catalog seed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("batch {batch} references unknown course {course}")]
    UnknownCourse { batch: String, course: String },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CourseSeed {
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub certifiable: bool,
    #[serde(default)]
    pub instructors: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchSeed {
    pub id: String,
    pub course_id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub certifiable: bool,
    #[serde(default)]
    pub participants: Vec<BatchParticipant>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HolderSeed {
    pub id: String,
    pub display_name: String,
}

/// On-disk shape of the catalog.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub administrators: Vec<String>,
    #[serde(default)]
    pub courses: Vec<CourseSeed>,
    #[serde(default)]
    pub batches: Vec<BatchSeed>,
    #[serde(default)]
    pub holders: Vec<HolderSeed>,
}

fn default_true() -> bool {
    true
}

pub struct Catalog {
    administrators: HashSet<String>,
    courses: HashMap<String, CourseSeed>,
    batches: HashMap<String, BatchSeed>,
    holders: HashMap<String, String>,
}

impl Catalog {
    /// Builds a catalog, rejecting batches that point at unknown courses.
    pub fn from_seed(seed: CatalogSeed) -> Result<Self, CatalogError> {
        let courses: HashMap<String, CourseSeed> = seed
            .courses
            .into_iter()
            .map(|course| (course.id.clone(), course))
            .collect();

        for batch in &seed.batches {
            if !courses.contains_key(&batch.course_id) {
                return Err(CatalogError::UnknownCourse {
                    batch: batch.id.clone(),
                    course: batch.course_id.clone(),
                });
            }
        }

        Ok(Self {
            administrators: seed.administrators.into_iter().collect(),
            courses,
            batches: seed
                .batches
                .into_iter()
                .map(|batch| (batch.id.clone(), batch))
                .collect(),
            holders: seed
                .holders
                .into_iter()
                .map(|holder| (holder.id, holder.display_name))
                .collect(),
        })
    }

    /// Loads a catalog from a JSON seed file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_seed(serde_json::from_str(&raw)?)?;
        log::info!(
            "loaded catalog from {}: {} courses, {} batches, {} holders",
            path.display(),
            catalog.courses.len(),
            catalog.batches.len(),
            catalog.holders.len()
        );
        Ok(catalog)
    }

    /// Course owning the subject: the explicit course, else the batch's course.
    fn course_of(&self, subject: &SubjectRef) -> Option<&CourseSeed> {
        let subject = subject.normalized();
        let course_id = match (&subject.course_id, &subject.batch_id) {
            (Some(course_id), _) => course_id.clone(),
            (None, Some(batch_id)) => self.batches.get(batch_id)?.course_id.clone(),
            (None, None) => return None,
        };
        self.courses.get(&course_id)
    }
}

#[async_trait]
impl SubjectCatalog for Catalog {
    async fn is_certifiable(&self, subject: &SubjectRef) -> Result<bool, CertificateError> {
        let subject = subject.normalized();
        if subject.course_id.is_none() && subject.batch_id.is_none() {
            return Ok(false);
        }

        if let Some(course_id) = &subject.course_id {
            match self.courses.get(course_id) {
                Some(course) if course.certifiable => {}
                _ => return Ok(false),
            }
        }

        if let Some(batch_id) = &subject.batch_id {
            let batch = match self.batches.get(batch_id) {
                Some(batch) if batch.certifiable => batch,
                _ => return Ok(false),
            };
            if let Some(course_id) = &subject.course_id {
                if &batch.course_id != course_id {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    async fn subject_title(&self, subject: &SubjectRef) -> Option<String> {
        let normalized = subject.normalized();
        let course_title = self.course_of(&normalized).map(|c| c.title.clone());
        let batch_title = normalized
            .batch_id
            .as_ref()
            .and_then(|id| self.batches.get(id))
            .map(|b| b.title.clone());

        match (course_title, batch_title) {
            (Some(course), Some(batch)) => Some(format!("{} ({})", course, batch)),
            (course, batch) => course.or(batch),
        }
    }

    async fn batch_subject(&self, batch_id: &str) -> Result<Option<SubjectRef>, CertificateError> {
        Ok(self
            .batches
            .get(batch_id.trim())
            .map(|batch| SubjectRef::batch(Some(batch.course_id.clone()), batch.id.clone())))
    }
}

#[async_trait]
impl AccessPolicy for Catalog {
    async fn can_issue(
        &self,
        actor_id: &str,
        subject: &SubjectRef,
    ) -> Result<bool, CertificateError> {
        if self.administrators.contains(actor_id) {
            return Ok(true);
        }
        Ok(self
            .course_of(subject)
            .map(|course| course.instructors.iter().any(|i| i == actor_id))
            .unwrap_or(false))
    }

    async fn can_revoke(&self, actor_id: &str) -> Result<bool, CertificateError> {
        Ok(self.administrators.contains(actor_id))
    }
}

#[async_trait]
impl ParticipantDirectory for Catalog {
    async fn batch_participants(
        &self,
        batch_id: &str,
    ) -> Result<Vec<BatchParticipant>, CertificateError> {
        Ok(self
            .batches
            .get(batch_id.trim())
            .map(|batch| batch.participants.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl HolderDirectory for Catalog {
    async fn display_name(&self, holder_id: &str) -> Option<String> {
        self.holders.get(holder_id).cloned()
    }
}
