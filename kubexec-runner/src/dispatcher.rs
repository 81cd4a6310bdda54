//! Dispatcher
//!
//! Turns one pending task into one tracked cluster job: derives the job
//! name, builds the manifest, submits it, and registers the job. The
//! dispatcher owns the submission counter, so one executor never produces
//! the same job name twice.

use std::sync::Arc;

use kubexec_core::domain::job::JobIdentifier;
use kubexec_core::domain::task::{TaskCommand, TaskKey};
use kubexec_core::dto::manifest::{JobManifest, JobManifestBuilder};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{DispatchError, RegistryError};
use crate::gateway::ClusterJobGateway;
use crate::registry::JobRegistry;

/// How task commands become worker jobs
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub builder: JobManifestBuilder,
    /// Program replacing the first command token
    pub entrypoint: String,
    /// Arguments appended to every command
    pub trailing_args: Vec<String>,
}

impl JobTemplate {
    pub fn from_config(config: &Config) -> Self {
        Self {
            builder: config.manifest_builder(),
            entrypoint: config.entrypoint.clone(),
            trailing_args: config.trailing_args.clone(),
        }
    }

    /// Builds the manifest of one job
    pub fn manifest(
        &self,
        job_id: &JobIdentifier,
        key: &TaskKey,
        command: &TaskCommand,
    ) -> JobManifest {
        let args = command.container_args(&self.entrypoint, &self.trailing_args);
        self.builder.build(
            job_id,
            args,
            &[
                ("kubexec/dag-id", key.dag_id.as_str()),
                ("kubexec/task-id", key.task_id.as_str()),
            ],
        )
    }
}

/// Submits tasks as cluster jobs
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    gateway: Arc<dyn ClusterJobGateway>,
    template: JobTemplate,
    /// Number of jobs registered so far
    counter: u64,
    clock: fn() -> i64,
}

impl Dispatcher {
    /// Creates a new dispatcher
    ///
    /// # Arguments
    /// * `registry` - Registry shared with the reconciler
    /// * `gateway` - Cluster the jobs are submitted to
    /// * `template` - Manifest template for every job
    pub fn new(
        registry: Arc<JobRegistry>,
        gateway: Arc<dyn ClusterJobGateway>,
        template: JobTemplate,
    ) -> Self {
        Self {
            registry,
            gateway,
            template,
            counter: 0,
            clock: || chrono::Utc::now().timestamp(),
        }
    }

    /// Replaces the epoch-seconds source used in job names
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Number of jobs successfully dispatched
    pub fn dispatched(&self) -> u64 {
        self.counter
    }

    /// Submits a task and starts tracking its job
    ///
    /// Nothing is registered and the counter does not move unless the
    /// cluster accepted the job. A task whose key already has a live job is
    /// refused before any remote call.
    pub async fn dispatch(
        &mut self,
        key: &TaskKey,
        command: &TaskCommand,
    ) -> Result<JobIdentifier, DispatchError> {
        if let Some(existing) = self.registry.job_for(key) {
            return Err(RegistryError::DuplicateTask {
                key: key.clone(),
                job_id: existing,
            }
            .into());
        }

        let counter = self.counter + 1;
        let job_id = JobIdentifier::generate(key, counter, (self.clock)());
        if job_id.exceeds_name_limit() {
            warn!(
                "Job name {} is {} characters long and may be rejected by the cluster",
                job_id,
                job_id.as_str().len()
            );
        }

        let manifest = self.template.manifest(&job_id, key, command);
        info!("Submitting job {} for task {}", job_id, key);

        let created = match self.gateway.submit(&manifest).await {
            Ok(created) => created,
            Err(e) => {
                if e.is_conflict() {
                    warn!("Job name {} is already taken in the cluster", job_id);
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.registry.add(created.clone(), key.clone()) {
            error!("Failed to register job {}: {}", created, e);
            // A name tracked for another task belongs to that task's job
            if self.registry.get(&created).is_err() {
                let deleted = self.gateway.delete(&created).await;
                if let Err(delete_err) = deleted {
                    warn!("Failed to delete untracked job {}: {}", created, delete_err);
                }
            }
            return Err(e.into());
        }

        self.counter = counter;
        info!(
            "Job {} created for task {} ({} tracked)",
            created,
            key,
            self.registry.size()
        );

        Ok(created)
    }
}
