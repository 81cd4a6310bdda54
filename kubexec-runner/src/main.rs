//! Kubexec Runner
//!
//! Runs scheduler tasks as cluster jobs with a bounded number in flight.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Client: HTTP communication with the cluster batch API
//! - Executor: dispatch, tracking and reporting of jobs
//! - Scheduler: timers driving the executor
//!
//! `run` submits a batch of tasks and exits once every job is terminal;
//! `serve` keeps dispatching and polling until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kubexec_client::ClusterClient;
use kubexec_core::dto::task::TaskSubmission;
use kubexec_runner::scheduler::ExecutorPoller;
use kubexec_runner::{Config, ExecutorLoop, KubernetesGateway, RetryPolicy, TracingStateSink};

#[derive(Parser)]
#[command(name = "kubexec-runner")]
#[command(about = "Run scheduler tasks as cluster jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a batch of tasks and wait for all of them to finish
    Run {
        /// JSON file with a list of tasks
        #[arg(long, env = "KUBEXEC_TASKS")]
        tasks: PathBuf,
    },
    /// Keep dispatching and polling until interrupted
    Serve {
        /// JSON file with tasks to enqueue at startup
        #[arg(long, env = "KUBEXEC_TASKS")]
        tasks: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kubexec_runner=info,kubexec_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting kubexec runner");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: executor_id={}, cluster_url={}, namespace={}",
        config.executor_id, config.cluster_url, config.namespace
    );

    // Initialize cluster client
    let client = Arc::new(build_client(&config)?);
    wait_for_cluster(&client).await?;
    info!("Cluster API reachable");

    let gateway = Arc::new(KubernetesGateway::new(Arc::clone(&client)));
    let sink = Arc::new(TracingStateSink::new());
    let executor = Arc::new(ExecutorLoop::from_config(
        &config,
        gateway,
        sink.clone(),
    ));

    match cli.command {
        Commands::Run { tasks } => {
            let count = enqueue_from_file(&executor, &tasks)?;
            info!("Enqueued {} task(s) from {}", count, tasks.display());

            executor
                .drain_and_wait(
                    config.reconcile_interval,
                    RetryPolicy::new(config.max_dispatch_attempts),
                )
                .await;

            info!(
                "All tasks finished: {} succeeded, {} failed",
                sink.succeeded(),
                sink.failed()
            );

            if sink.failed() > 0 {
                anyhow::bail!("{} task(s) failed", sink.failed());
            }
        }
        Commands::Serve { tasks } => {
            if let Some(path) = tasks {
                let count = enqueue_from_file(&executor, &path)?;
                info!("Enqueued {} task(s) from {}", count, path.display());
            }

            let poller = ExecutorPoller::new(Arc::clone(&executor), &config);
            poller
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested");
                })
                .await;
        }
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment ({:#}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Builds the cluster client described by the configuration
fn build_client(config: &Config) -> Result<ClusterClient> {
    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let client = ClusterClient::with_client(
        config.cluster_url.clone(),
        config.namespace.clone(),
        http_client,
    );

    Ok(match &config.token {
        Some(token) => client.with_token(token.clone()),
        None => client,
    })
}

/// Reads a task list and enqueues every task
fn enqueue_from_file(executor: &ExecutorLoop, path: &Path) -> Result<usize> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks file {}", path.display()))?;
    let submissions: Vec<TaskSubmission> = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse tasks file {}", path.display()))?;

    let count = submissions.len();
    for submission in submissions {
        let (key, command) = submission.into_parts();
        executor.enqueue(key, command);
    }

    Ok(count)
}

/// Waits for the cluster API with retry logic and exponential backoff
///
/// The API server may still be starting when the runner comes up (common
/// when both are launched together).
async fn wait_for_cluster(client: &ClusterClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.check_api().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Reached cluster API after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) if e.is_client_error() => {
                // 4xx answers are final
                error!("Cluster API rejected the runner: {}", e);
                return Err(anyhow::anyhow!("Cluster API rejected the runner: {}", e));
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to reach cluster API after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Cluster API unavailable: {}", e));
                }

                warn!(
                    "Failed to reach cluster API (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
