//! Cluster gateway
//!
//! The executor reaches the cluster only through [`ClusterJobGateway`]. The
//! trait is object safe and `Send + Sync` so the dispatch and reconcile
//! workers can share one `Arc<dyn ClusterJobGateway>` without extra locking.

mod kubernetes;

pub use kubernetes::KubernetesGateway;

use async_trait::async_trait;
use kubexec_core::domain::job::{ExternalJobStatus, JobIdentifier};
use kubexec_core::dto::manifest::JobManifest;

use crate::error::GatewayError;

/// Remote operations on cluster jobs
#[async_trait]
pub trait ClusterJobGateway: Send + Sync {
    /// Creates a job from a fully built manifest
    ///
    /// # Returns
    /// The name the cluster registered the job under
    async fn submit(&self, manifest: &JobManifest) -> Result<JobIdentifier, GatewayError>;

    /// Reads and classifies the status of a job
    ///
    /// Transient or unknown cluster states are reported as
    /// [`ExternalJobStatus::Active`].
    async fn status(&self, job_id: &JobIdentifier) -> Result<ExternalJobStatus, GatewayError>;

    /// Deletes a job resource
    async fn delete(&self, job_id: &JobIdentifier) -> Result<(), GatewayError>;
}
