//! Job-related API endpoints

use crate::ClusterClient;
use crate::error::Result;
use kubexec_core::domain::job::JobIdentifier;
use kubexec_core::dto::job::ClusterJob;
use kubexec_core::dto::manifest::JobManifest;
use serde::Serialize;
use tracing::debug;

/// Body of a DELETE request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOptions {
    propagation_policy: &'static str,
}

impl ClusterClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Create a job from a manifest
    ///
    /// # Arguments
    /// * `manifest` - The job manifest; its name becomes the resource name
    ///
    /// # Returns
    /// The job as accepted by the API server
    pub async fn create_job(&self, manifest: &JobManifest) -> Result<ClusterJob> {
        let url = self.jobs_url();
        debug!("Creating job {} at {}", manifest.name(), url);

        let response = self
            .authorize(self.client.post(&url))
            .json(manifest)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a job by name
    ///
    /// # Arguments
    /// * `name` - The job resource name
    ///
    /// # Returns
    /// The job, including its pod counters
    pub async fn get_job(&self, name: &JobIdentifier) -> Result<ClusterJob> {
        let url = self.job_url(name.as_str());
        let response = self.authorize(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// Delete a job and, in the background, its pods
    ///
    /// # Arguments
    /// * `name` - The job resource name
    pub async fn delete_job(&self, name: &JobIdentifier) -> Result<()> {
        let url = self.job_url(name.as_str());
        debug!("Deleting job {}", name);

        let response = self
            .authorize(self.client.delete(&url))
            .json(&DeleteOptions {
                propagation_policy: "Background",
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Connectivity
    // =============================================================================

    /// Check that the batch API is reachable and the namespace is readable
    pub async fn check_api(&self) -> Result<()> {
        let url = self.jobs_url();
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("limit", "1")])
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
