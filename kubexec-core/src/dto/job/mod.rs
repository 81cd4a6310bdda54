//! Job documents returned by the cluster batch API

use serde::{Deserialize, Serialize};

use crate::domain::job::{ExternalJobStatus, JobIdentifier};

/// A job resource as reported by the cluster
///
/// Only the fields the executor reads are modelled; everything else in the
/// response body is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterJob {
    #[serde(default)]
    pub metadata: ClusterJobMetadata,
    #[serde(default)]
    pub status: ClusterJobStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterJobMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Pod counters of a job resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterJobStatus {
    pub active: Option<i32>,
    pub succeeded: Option<i32>,
    pub failed: Option<i32>,
}

impl ClusterJob {
    pub fn identifier(&self) -> JobIdentifier {
        JobIdentifier::from_name(self.metadata.name.clone())
    }
}

impl ClusterJobStatus {
    /// Classifies the pod counters
    ///
    /// Any failed pod makes the job failed, even if another pod succeeded.
    /// A job with neither failed nor succeeded pods is still active.
    pub fn classify(&self) -> ExternalJobStatus {
        if self.failed.unwrap_or(0) > 0 {
            ExternalJobStatus::Failed
        } else if self.succeeded.unwrap_or(0) > 0 {
            ExternalJobStatus::Succeeded
        } else {
            ExternalJobStatus::Active
        }
    }
}
