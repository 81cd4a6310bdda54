//! Job registry
//!
//! Tracks which cluster job runs which task. Entries are added by the
//! dispatcher after a successful submit and removed by the reconciler when a
//! terminal status is observed. Every operation takes the single registry
//! lock for its whole duration and never awaits while holding it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use kubexec_core::domain::job::JobIdentifier;
use kubexec_core::domain::task::TaskKey;

use crate::error::RegistryError;

/// Registry of jobs that were submitted and have not reached a terminal state
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// Entries in submission order
    entries: Vec<(JobIdentifier, TaskKey)>,
    /// Index: task key -> live job
    by_task: HashMap<TaskKey, JobIdentifier>,
}

impl RegistryInner {
    fn position(&self, job_id: &JobIdentifier) -> Option<usize> {
        self.entries.iter().position(|(id, _)| id == job_id)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Both indexes are updated after all fallible work, so a poisoned
        // lock still guards consistent data.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts tracking a job
    pub fn add(&self, job_id: JobIdentifier, key: TaskKey) -> Result<(), RegistryError> {
        let mut inner = self.lock();

        if inner.position(&job_id).is_some() {
            return Err(RegistryError::DuplicateJob(job_id));
        }

        if let Some(existing) = inner.by_task.get(&key) {
            return Err(RegistryError::DuplicateTask {
                key,
                job_id: existing.clone(),
            });
        }

        inner.by_task.insert(key.clone(), job_id.clone());
        inner.entries.push((job_id, key));
        Ok(())
    }

    /// Looks up the task of a tracked job
    pub fn get(&self, job_id: &JobIdentifier) -> Result<TaskKey, RegistryError> {
        let inner = self.lock();
        inner
            .position(job_id)
            .map(|i| inner.entries[i].1.clone())
            .ok_or_else(|| RegistryError::NotFound(job_id.clone()))
    }

    /// Stops tracking a job, returning its task
    pub fn remove(&self, job_id: &JobIdentifier) -> Result<TaskKey, RegistryError> {
        let mut inner = self.lock();

        let index = inner
            .position(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.clone()))?;

        let (_, key) = inner.entries.remove(index);
        inner.by_task.remove(&key);
        Ok(key)
    }

    /// Live job of a task, if any
    pub fn job_for(&self, key: &TaskKey) -> Option<JobIdentifier> {
        self.lock().by_task.get(key).cloned()
    }

    pub fn contains_task(&self, key: &TaskKey) -> bool {
        self.lock().by_task.contains_key(key)
    }

    /// Copy of all entries in submission order
    pub fn snapshot(&self) -> Vec<(JobIdentifier, TaskKey)> {
        self.lock().entries.clone()
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
