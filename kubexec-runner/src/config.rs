//! Executor configuration
//!
//! Defines all configurable parameters for the executor including the
//! cluster connection, the worker job template, the concurrency ceiling and
//! the dispatch and reconcile cadences.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use kubexec_core::dto::manifest::{ClaimMount, JobManifestBuilder, SecretEnv};

/// Default number of jobs tracked at once
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// Executor configuration
///
/// Intervals and limits are configurable so the same binary can drive a
/// local test cluster or a busy production namespace.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this executor instance, attached to every job as a label
    pub executor_id: String,

    /// API server base URL (e.g., "http://localhost:8001")
    pub cluster_url: String,

    /// Namespace jobs are created in
    pub namespace: String,

    /// Bearer token for the API server
    pub token: Option<String>,

    /// Timeout applied to each API request
    pub request_timeout: Duration,

    /// Worker image every job runs
    pub worker_image: String,

    /// Pull policy of the worker image
    pub image_pull_policy: String,

    /// Program replacing the first token of each task command
    pub entrypoint: String,

    /// Arguments appended to each task command
    pub trailing_args: Vec<String>,

    /// Claim holding the DAG files, mounted into every worker
    pub dags_volume_claim: Option<String>,

    /// Where the DAG volume is mounted in the worker
    pub dags_mount_path: String,

    /// Extra labels for every job
    pub labels: HashMap<String, String>,

    /// Node labels a worker pod must be scheduled onto
    pub node_selector: HashMap<String, String>,

    /// Secret keys exposed to every worker as environment variables
    pub secrets: Vec<SecretEnv>,

    /// Maximum number of jobs tracked at once
    pub max_concurrent_jobs: usize,

    /// How often the dispatch worker ticks
    pub dispatch_interval: Duration,

    /// How often tracked jobs are polled
    pub reconcile_interval: Duration,

    /// How many times a task is submitted before it is dropped
    pub max_dispatch_attempts: u32,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(executor_id: String, cluster_url: String) -> Self {
        Self {
            executor_id,
            cluster_url,
            namespace: "default".to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
            worker_image: "airflow-slave:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            entrypoint: "/usr/local/airflow/entrypoint.sh".to_string(),
            trailing_args: vec!["-km".to_string()],
            dags_volume_claim: None,
            dags_mount_path: "/usr/local/airflow/dags".to_string(),
            labels: HashMap::new(),
            node_selector: HashMap::new(),
            secrets: Vec::new(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            dispatch_interval: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(5),
            max_dispatch_attempts: 3,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - KUBE_API_URL (required)
    /// - EXECUTOR_ID (optional, default: random uuid)
    /// - KUBE_NAMESPACE (optional, default: default)
    /// - KUBE_TOKEN (optional)
    /// - REQUEST_TIMEOUT (optional, seconds, default: 30)
    /// - WORKER_IMAGE (optional, default: airflow-slave:latest)
    /// - IMAGE_PULL_POLICY (optional, default: IfNotPresent)
    /// - WORKER_ENTRYPOINT (optional, default: /usr/local/airflow/entrypoint.sh)
    /// - DAGS_VOLUME_CLAIM (optional)
    /// - DAGS_MOUNT_PATH (optional, default: /usr/local/airflow/dags)
    /// - JOB_LABELS (optional, `key=value,...`)
    /// - NODE_SELECTOR (optional, `key=value,...`)
    /// - WORKER_SECRETS (optional, `ENV_VAR=secret:key,...`)
    /// - MAX_CONCURRENT_JOBS (optional, default: 3)
    /// - DISPATCH_INTERVAL (optional, seconds, default: 1)
    /// - RECONCILE_INTERVAL (optional, seconds, default: 5)
    /// - MAX_DISPATCH_ATTEMPTS (optional, default: 3)
    pub fn from_env() -> anyhow::Result<Self> {
        let cluster_url = std::env::var("KUBE_API_URL")
            .map_err(|_| anyhow::anyhow!("KUBE_API_URL environment variable not set"))?;

        let executor_id =
            std::env::var("EXECUTOR_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let mut config = Self::new(executor_id, cluster_url);

        if let Ok(namespace) = std::env::var("KUBE_NAMESPACE") {
            config.namespace = namespace;
        }
        config.token = std::env::var("KUBE_TOKEN").ok().filter(|t| !t.is_empty());

        if let Some(timeout) = env_parse::<u64>("REQUEST_TIMEOUT") {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Ok(image) = std::env::var("WORKER_IMAGE") {
            config.worker_image = image;
        }
        if let Ok(policy) = std::env::var("IMAGE_PULL_POLICY") {
            config.image_pull_policy = policy;
        }
        if let Ok(entrypoint) = std::env::var("WORKER_ENTRYPOINT") {
            config.entrypoint = entrypoint;
        }
        config.dags_volume_claim = std::env::var("DAGS_VOLUME_CLAIM")
            .ok()
            .filter(|c| !c.is_empty());
        if let Ok(path) = std::env::var("DAGS_MOUNT_PATH") {
            config.dags_mount_path = path;
        }

        if let Ok(raw) = std::env::var("JOB_LABELS") {
            for (key, value) in parse_pairs(&raw).context("Invalid JOB_LABELS")? {
                config = config.with_label(key, value);
            }
        }
        if let Ok(raw) = std::env::var("NODE_SELECTOR") {
            config.node_selector = parse_pairs(&raw)
                .context("Invalid NODE_SELECTOR")?
                .into_iter()
                .collect();
        }
        if let Ok(raw) = std::env::var("WORKER_SECRETS") {
            config.secrets = parse_secrets(&raw).context("Invalid WORKER_SECRETS")?;
        }

        if let Some(max) = env_parse::<usize>("MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = max;
        }
        if let Some(secs) = env_parse::<u64>("DISPATCH_INTERVAL") {
            config.dispatch_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RECONCILE_INTERVAL") {
            config.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_parse::<u32>("MAX_DISPATCH_ATTEMPTS") {
            config.max_dispatch_attempts = attempts;
        }

        Ok(config)
    }

    /// Adds a label attached to every job
    pub fn with_label(mut self, key: String, value: String) -> Self {
        self.labels.insert(key, value);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.executor_id.is_empty() {
            anyhow::bail!("executor_id cannot be empty");
        }

        if !self.cluster_url.starts_with("http://") && !self.cluster_url.starts_with("https://") {
            anyhow::bail!("cluster_url must start with http:// or https://");
        }

        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if self.worker_image.is_empty() {
            anyhow::bail!("worker_image cannot be empty");
        }

        if self.entrypoint.is_empty() {
            anyhow::bail!("entrypoint cannot be empty");
        }

        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("max_concurrent_jobs must be greater than 0");
        }

        if self.dispatch_interval.is_zero() {
            anyhow::bail!("dispatch_interval must be greater than 0");
        }

        if self.reconcile_interval.is_zero() {
            anyhow::bail!("reconcile_interval must be greater than 0");
        }

        if self.max_dispatch_attempts == 0 {
            anyhow::bail!("max_dispatch_attempts must be greater than 0");
        }

        Ok(())
    }

    /// Builds the manifest template shared by every job of this executor
    pub fn manifest_builder(&self) -> JobManifestBuilder {
        let mut builder = JobManifestBuilder::new(self.worker_image.clone())
            .with_pull_policy(self.image_pull_policy.clone())
            .with_label("kubexec/executor-id", &self.executor_id);

        for (key, value) in &self.labels {
            builder = builder.with_label(key.clone(), value);
        }

        for (key, value) in &self.node_selector {
            builder = builder.with_node_selector(key.clone(), value.clone());
        }

        for secret in &self.secrets {
            builder = builder.with_secret(secret.clone());
        }

        if let Some(claim) = &self.dags_volume_claim {
            builder = builder.with_mount(ClaimMount {
                name: "shared-data".to_string(),
                claim_name: claim.clone(),
                mount_path: self.dags_mount_path.clone(),
                read_only: false,
            });
        }

        builder
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8001".to_string(),
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

/// Parses `key=value` entries separated by commas
fn parse_pairs(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<(String, String)> {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{}'", entry))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("empty key in '{}'", entry);
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parses `ENV_VAR=secret:key` entries separated by commas
fn parse_secrets(raw: &str) -> anyhow::Result<Vec<SecretEnv>> {
    parse_pairs(raw)?
        .into_iter()
        .map(|(env_name, reference)| -> anyhow::Result<SecretEnv> {
            let (secret_name, key) = reference
                .split_once(':')
                .filter(|(secret, key)| !secret.is_empty() && !key.is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("expected secret:key for {}, got '{}'", env_name, reference)
                })?;
            Ok(SecretEnv {
                env_name,
                secret_name: secret_name.to_string(),
                key: key.to_string(),
            })
        })
        .collect()
}
