//! Error types for the executor

use kubexec_client::ClientError;
use kubexec_core::domain::job::JobIdentifier;
use kubexec_core::domain::task::TaskKey;
use thiserror::Error;

use crate::executor::PendingTask;

/// Registry invariant violations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The job name is already tracked
    #[error("job {0} is already tracked")]
    DuplicateJob(JobIdentifier),

    /// The task already has a live job
    #[error("task {key} is already tracked as job {job_id}")]
    DuplicateTask { key: TaskKey, job_id: JobIdentifier },

    /// The job is not tracked
    #[error("job {0} is not tracked")]
    NotFound(JobIdentifier),
}

/// Failures of a remote cluster call
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to submit job {job_id}: {source}")]
    Submit {
        job_id: JobIdentifier,
        #[source]
        source: ClientError,
    },

    #[error("failed to read status of job {job_id}: {source}")]
    Status {
        job_id: JobIdentifier,
        #[source]
        source: ClientError,
    },

    #[error("failed to delete job {job_id}: {source}")]
    Delete {
        job_id: JobIdentifier,
        #[source]
        source: ClientError,
    },
}

impl GatewayError {
    fn client_error(&self) -> &ClientError {
        match self {
            Self::Submit { source, .. }
            | Self::Status { source, .. }
            | Self::Delete { source, .. } => source,
        }
    }

    /// Whether the cluster has no job under this name
    pub fn is_not_found(&self) -> bool {
        self.client_error().is_not_found()
    }

    /// Whether the cluster already had a job under this name
    pub fn is_conflict(&self) -> bool {
        self.client_error().is_conflict()
    }
}

/// Failures of a single dispatch attempt
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failures surfaced by the executor loop
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A task could not be dispatched and was handed back to the caller
    #[error("dispatch of task {} failed: {source}", .task.key)]
    Dispatch {
        task: PendingTask,
        #[source]
        source: DispatchError,
    },
}

impl DispatchError {
    /// Whether the task was refused because its key already has a live job
    pub fn is_duplicate_task(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::DuplicateTask { .. }))
    }
}
