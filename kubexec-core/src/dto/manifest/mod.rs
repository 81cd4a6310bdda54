//! Job manifest DTOs
//!
//! A `batch/v1` Job document with a single worker container. The builder
//! fills in image, command, labels, volume mounts, node selectors and secret
//! environment variables; the executor only supplies the job name and the
//! per-task command and labels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::job::{JobIdentifier, MAX_JOB_NAME_LEN};

const CONTAINER_NAME: &str = "base";

/// Job resource submitted to the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub backoff_limit: i32,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,
    pub restart_policy: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value_from: EnvVarSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    pub secret_key_ref: SecretKeySelector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub persistent_volume_claim: ClaimSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    pub claim_name: String,
}

impl JobManifest {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn container(&self) -> Option<&Container> {
        self.spec.template.spec.containers.first()
    }
}

/// Volume backed by a persistent volume claim, mounted into the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMount {
    pub name: String,
    pub claim_name: String,
    pub mount_path: String,
    pub read_only: bool,
}

/// Secret key exposed to the worker as an environment variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnv {
    pub env_name: String,
    pub secret_name: String,
    pub key: String,
}

/// Builds job manifests for one worker image
///
/// Everything except the job name, the command and per-task labels is fixed
/// at construction and shared by every job built.
#[derive(Debug, Clone)]
pub struct JobManifestBuilder {
    image: String,
    image_pull_policy: String,
    labels: BTreeMap<String, String>,
    node_selector: BTreeMap<String, String>,
    mounts: Vec<ClaimMount>,
    secrets: Vec<SecretEnv>,
}

impl JobManifestBuilder {
    /// Creates a builder for the given worker image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            image_pull_policy: "IfNotPresent".to_string(),
            labels: BTreeMap::new(),
            node_selector: BTreeMap::new(),
            mounts: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn with_pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.image_pull_policy = policy.into();
        self
    }

    /// Adds a label applied to every job and pod
    pub fn with_label(mut self, key: impl Into<String>, value: &str) -> Self {
        self.labels.insert(key.into(), sanitize_label_value(value));
        self
    }

    pub fn with_node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_selector.insert(key.into(), value.into());
        self
    }

    pub fn with_mount(mut self, mount: ClaimMount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_secret(mut self, secret: SecretEnv) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Builds the manifest for one job
    ///
    /// # Arguments
    /// * `name` - Job resource name
    /// * `command` - Full container command, entrypoint first
    /// * `task_labels` - Labels identifying the task, sanitized before use
    pub fn build(
        &self,
        name: &JobIdentifier,
        command: Vec<String>,
        task_labels: &[(&str, &str)],
    ) -> JobManifest {
        let mut labels = self.labels.clone();
        for (key, value) in task_labels {
            labels.insert((*key).to_string(), sanitize_label_value(value));
        }

        let env = self
            .secrets
            .iter()
            .map(|secret| EnvVar {
                name: secret.env_name.clone(),
                value_from: EnvVarSource {
                    secret_key_ref: SecretKeySelector {
                        name: secret.secret_name.clone(),
                        key: secret.key.clone(),
                    },
                },
            })
            .collect();

        let volume_mounts = self
            .mounts
            .iter()
            .map(|mount| VolumeMount {
                name: mount.name.clone(),
                mount_path: mount.mount_path.clone(),
                read_only: mount.read_only,
            })
            .collect();

        let volumes = self
            .mounts
            .iter()
            .map(|mount| Volume {
                name: mount.name.clone(),
                persistent_volume_claim: ClaimSource {
                    claim_name: mount.claim_name.clone(),
                },
            })
            .collect();

        let metadata = ObjectMeta {
            name: name.as_str().to_string(),
            labels,
        };

        JobManifest {
            api_version: "batch/v1".to_string(),
            kind: "Job".to_string(),
            metadata: metadata.clone(),
            spec: JobSpec {
                backoff_limit: 0,
                template: PodTemplateSpec {
                    metadata,
                    spec: PodSpec {
                        containers: vec![Container {
                            name: CONTAINER_NAME.to_string(),
                            image: self.image.clone(),
                            image_pull_policy: self.image_pull_policy.clone(),
                            command,
                            env,
                            volume_mounts,
                        }],
                        restart_policy: "Never".to_string(),
                        node_selector: self.node_selector.clone(),
                        volumes,
                    },
                },
            },
        }
    }
}

/// Makes a string usable as a label value
///
/// Label values allow alphanumerics, `-`, `_` and `.`, must start and end
/// with an alphanumeric and are at most 63 characters long.
pub fn sanitize_label_value(value: &str) -> String {
    let mapped: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_JOB_NAME_LEN)
        .collect();

    mapped
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}
