//! In-memory gateway and sink for tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kubexec_client::ClientError;
use kubexec_core::domain::job::{ExternalJobStatus, JobIdentifier, TerminalState};
use kubexec_core::domain::task::TaskKey;
use kubexec_core::dto::manifest::{JobManifest, JobManifestBuilder};

use crate::dispatcher::JobTemplate;
use crate::error::GatewayError;
use crate::gateway::ClusterJobGateway;
use crate::registry::JobRegistry;
use crate::sink::StateSink;

pub(crate) fn key(task: &str) -> TaskKey {
    TaskKey::new("dagA", task, "2024-01-01T00:00:00".parse().unwrap())
}

pub(crate) fn template() -> JobTemplate {
    JobTemplate {
        builder: JobManifestBuilder::new("worker:test"),
        entrypoint: "/entrypoint.sh".to_string(),
        trailing_args: vec!["-km".to_string()],
    }
}

fn scripted_failure() -> ClientError {
    ClientError::api_error(500, "scripted failure")
}

/// Gateway whose answers are set up by the test
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    state: Mutex<GatewayState>,
}

#[derive(Default)]
struct GatewayState {
    submitted: Vec<JobManifest>,
    failing_submits: usize,
    renamed_submit: Option<String>,
    statuses: HashMap<JobIdentifier, ExternalJobStatus>,
    default_status: Option<ExternalJobStatus>,
    succeed_after: Option<usize>,
    status_calls: HashMap<JobIdentifier, usize>,
    failing_status: HashSet<JobIdentifier>,
    vanished: HashSet<JobIdentifier>,
    fail_deletes: bool,
    deleted: Vec<JobIdentifier>,
    remove_on_status: Option<(JobIdentifier, Arc<JobRegistry>)>,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap()
    }

    /// Makes the next `count` submits fail
    pub(crate) fn fail_next_submits(&self, count: usize) {
        self.state().failing_submits = count;
    }

    /// Makes the cluster create submitted jobs under `name`
    pub(crate) fn rename_submits(&self, name: &str) {
        self.state().renamed_submit = Some(name.to_string());
    }

    /// Makes status reads of `job_id` answer as if the job was gone
    pub(crate) fn vanish(&self, job_id: &JobIdentifier) {
        self.state().vanished.insert(job_id.clone());
    }

    pub(crate) fn set_status(&self, job_id: &JobIdentifier, status: ExternalJobStatus) {
        self.state().statuses.insert(job_id.clone(), status);
    }

    /// Status of jobs without an explicit one
    pub(crate) fn set_default_status(&self, status: ExternalJobStatus) {
        self.state().default_status = Some(status);
    }

    /// Jobs without an explicit status succeed once polled more than `polls` times
    pub(crate) fn succeed_after_polls(&self, polls: usize) {
        self.state().succeed_after = Some(polls);
    }

    /// Makes the next status read of `job_id` fail
    pub(crate) fn fail_next_status(&self, job_id: &JobIdentifier) {
        self.state().failing_status.insert(job_id.clone());
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.state().fail_deletes = fail;
    }

    /// Removes `job_id` from `registry` while its status is being read
    pub(crate) fn remove_on_status(&self, job_id: &JobIdentifier, registry: Arc<JobRegistry>) {
        self.state().remove_on_status = Some((job_id.clone(), registry));
    }

    pub(crate) fn submitted(&self) -> Vec<JobManifest> {
        self.state().submitted.clone()
    }

    pub(crate) fn deleted(&self) -> Vec<JobIdentifier> {
        self.state().deleted.clone()
    }

    pub(crate) fn status_calls(&self, job_id: &JobIdentifier) -> usize {
        self.state().status_calls.get(job_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ClusterJobGateway for ScriptedGateway {
    async fn submit(&self, manifest: &JobManifest) -> Result<JobIdentifier, GatewayError> {
        let mut state = self.state();
        let job_id = JobIdentifier::from_name(manifest.name());

        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(GatewayError::Submit {
                job_id,
                source: scripted_failure(),
            });
        }

        state.submitted.push(manifest.clone());
        match &state.renamed_submit {
            Some(name) => Ok(JobIdentifier::from_name(name.clone())),
            None => Ok(job_id),
        }
    }

    async fn status(&self, job_id: &JobIdentifier) -> Result<ExternalJobStatus, GatewayError> {
        let (status, registry) = {
            let mut state = self.state();

            let calls = state.status_calls.entry(job_id.clone()).or_insert(0);
            *calls += 1;
            let calls = *calls;

            if state.failing_status.remove(job_id) {
                return Err(GatewayError::Status {
                    job_id: job_id.clone(),
                    source: scripted_failure(),
                });
            }

            if state.vanished.contains(job_id) {
                return Err(GatewayError::Status {
                    job_id: job_id.clone(),
                    source: ClientError::api_error(404, "job not found"),
                });
            }

            let status = match state.statuses.get(job_id) {
                Some(status) => *status,
                None => match state.succeed_after {
                    Some(polls) if calls > polls => ExternalJobStatus::Succeeded,
                    Some(_) => ExternalJobStatus::Active,
                    None => state.default_status.unwrap_or(ExternalJobStatus::Active),
                },
            };

            let registry = match &state.remove_on_status {
                Some((target, registry)) if target == job_id => Some(Arc::clone(registry)),
                _ => None,
            };

            (status, registry)
        };

        if let Some(registry) = registry {
            let _ = registry.remove(job_id);
        }

        Ok(status)
    }

    async fn delete(&self, job_id: &JobIdentifier) -> Result<(), GatewayError> {
        let mut state = self.state();

        if state.fail_deletes {
            return Err(GatewayError::Delete {
                job_id: job_id.clone(),
                source: scripted_failure(),
            });
        }

        state.deleted.push(job_id.clone());
        Ok(())
    }
}

/// Sink that records every report
#[derive(Default)]
pub(crate) struct RecordingSink {
    reports: Mutex<Vec<(TaskKey, TerminalState)>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reports(&self) -> Vec<(TaskKey, TerminalState)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateSink for RecordingSink {
    async fn report(&self, key: &TaskKey, state: TerminalState) {
        self.reports.lock().unwrap().push((key.clone(), state));
    }
}
