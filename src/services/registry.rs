//! In-memory job table; the authoritative source for job status.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::{Job, TransitionError};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} already exists")]
    Duplicate(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Concurrent map of jobs keyed by ID.
///
/// Each job is only written by its own orchestrator task; the lock guards the
/// map itself against concurrent access from different jobs and readers.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, job: Job) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(RegistryError::Duplicate(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    /// Snapshot of the latest state.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Apply `change` to a copy of the job and replace the entry only if it succeeds.
    pub async fn update<F>(&self, id: Uuid, change: F) -> Result<Job, RegistryError>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        let current = jobs.get(&id).ok_or(RegistryError::NotFound(id))?;

        let mut next = current.clone();
        change(&mut next)?;
        jobs.insert(id, next.clone());
        Ok(next)
    }

    pub async fn delete(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().await.remove(&id)
    }

    /// All jobs, newest first.
    pub async fn list_all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Remove terminal jobs whose last update is older than `retention`.
    /// Jobs still in flight are never evicted.
    pub async fn evict_expired(&self, retention: chrono::Duration, now: DateTime<Utc>) -> Vec<Uuid> {
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Vec::new();
        };
        let mut jobs = self.jobs.write().await;

        let expired: Vec<Uuid> = jobs
            .values()
            .filter(|job| job.is_terminal() && job.updated_at < cutoff)
            .map(|job| job.id)
            .collect();

        for id in &expired {
            jobs.remove(id);
        }
        expired
    }
}
