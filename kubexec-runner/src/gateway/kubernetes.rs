//! Kubernetes gateway
//!
//! Implements [`ClusterJobGateway`] over the batch/v1 Jobs API.

use async_trait::async_trait;
use kubexec_client::ClusterClient;
use kubexec_core::domain::job::{ExternalJobStatus, JobIdentifier};
use kubexec_core::dto::job::ClusterJob;
use kubexec_core::dto::manifest::JobManifest;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ClusterJobGateway;
use crate::error::GatewayError;

/// Gateway backed by a [`ClusterClient`]
pub struct KubernetesGateway {
    client: Arc<ClusterClient>,
}

impl KubernetesGateway {
    /// Creates a new gateway
    ///
    /// # Arguments
    /// * `client` - Client bound to the namespace jobs run in
    pub fn new(client: Arc<ClusterClient>) -> Self {
        Self { client }
    }
}

/// Name of the job the cluster actually created
///
/// The returned job is what gets tracked, so a job created under another
/// name is never left running untracked.
fn accepted_name(requested: JobIdentifier, job: &ClusterJob) -> JobIdentifier {
    let created = job.identifier();
    if created.as_str().is_empty() {
        // Response carried no job metadata
        return requested;
    }

    if created != requested {
        warn!(
            "Requested job {} but the cluster created {}; tracking the created job",
            requested, created
        );
    }

    created
}

#[async_trait]
impl ClusterJobGateway for KubernetesGateway {
    async fn submit(&self, manifest: &JobManifest) -> Result<JobIdentifier, GatewayError> {
        let requested = JobIdentifier::from_name(manifest.name());

        let job = self
            .client
            .create_job(manifest)
            .await
            .map_err(|source| GatewayError::Submit {
                job_id: requested.clone(),
                source,
            })?;

        let created = accepted_name(requested, &job);
        debug!("Cluster accepted job {}", created);
        Ok(created)
    }

    async fn status(&self, job_id: &JobIdentifier) -> Result<ExternalJobStatus, GatewayError> {
        let job = self
            .client
            .get_job(job_id)
            .await
            .map_err(|source| GatewayError::Status {
                job_id: job_id.clone(),
                source,
            })?;

        Ok(job.status.classify())
    }

    async fn delete(&self, job_id: &JobIdentifier) -> Result<(), GatewayError> {
        self.client
            .delete_job(job_id)
            .await
            .map_err(|source| GatewayError::Delete {
                job_id: job_id.clone(),
                source,
            })
    }
}
