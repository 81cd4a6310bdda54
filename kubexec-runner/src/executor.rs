//! Executor loop
//!
//! Ties the dispatcher and the reconciler together under a concurrency
//! ceiling. The calling scheduler enqueues `(key, command)` pairs and drives
//! [`ExecutorLoop::tick`] and [`ExecutorLoop::reconcile_once`] on its own
//! cadence; terminal outcomes come back through the [`StateSink`].
//!
//! The registry is the only state shared between dispatching and
//! reconciling. Dispatches are serialized by the dispatcher lock and
//! reconciliation passes by the reconciler lock; neither is the registry
//! lock, so remote calls never block registry access.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kubexec_core::domain::job::{JobIdentifier, TaskOutcome, TerminalState};
use kubexec_core::domain::task::{TaskCommand, TaskKey};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, JobTemplate};
use crate::error::ExecutorError;
use crate::gateway::ClusterJobGateway;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::registry::JobRegistry;
use crate::sink::StateSink;

/// A task waiting to be dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub key: TaskKey,
    pub command: TaskCommand,
    /// Dispatch attempts made so far
    pub attempts: u32,
}

impl PendingTask {
    pub fn new(key: TaskKey, command: TaskCommand) -> Self {
        Self {
            key,
            command,
            attempts: 0,
        }
    }
}

/// What the dispatch half of a tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStep {
    /// A task was submitted under this job name
    Dispatched(JobIdentifier),
    /// The ceiling was reached; pending tasks wait
    AtCapacity,
    /// Nothing was pending
    Idle,
    /// The next task still has a live job and went to the back of the queue
    Deferred(TaskKey),
}

/// Result of one control loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Outcomes handed to the sink before dispatching
    pub reported: usize,
    pub step: DispatchStep,
}

/// What to do with a task whose dispatch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total dispatch attempts before the task is dropped
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn should_retry(&self, task: &PendingTask) -> bool {
        task.attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Bounded-concurrency job executor
pub struct ExecutorLoop {
    registry: Arc<JobRegistry>,
    dispatcher: tokio::sync::Mutex<Dispatcher>,
    reconciler: tokio::sync::Mutex<Reconciler>,
    pending: Mutex<VecDeque<PendingTask>>,
    outcomes: tokio::sync::Mutex<UnboundedReceiver<TaskOutcome>>,
    sink: Arc<dyn StateSink>,
    max_concurrent_jobs: usize,
}

impl ExecutorLoop {
    /// Creates a new executor
    ///
    /// # Arguments
    /// * `gateway` - Cluster jobs are submitted to and polled from
    /// * `sink` - Receiver of terminal task states
    /// * `template` - How tasks become job manifests
    /// * `max_concurrent_jobs` - Ceiling on tracked jobs
    pub fn new(
        gateway: Arc<dyn ClusterJobGateway>,
        sink: Arc<dyn StateSink>,
        template: JobTemplate,
        max_concurrent_jobs: usize,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&gateway), template);
        let reconciler = Reconciler::new(Arc::clone(&registry), gateway, tx);

        Self::from_parts(registry, dispatcher, reconciler, rx, sink, max_concurrent_jobs)
    }

    /// Creates an executor from configuration
    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn ClusterJobGateway>,
        sink: Arc<dyn StateSink>,
    ) -> Self {
        Self::new(
            gateway,
            sink,
            JobTemplate::from_config(config),
            config.max_concurrent_jobs,
        )
    }

    fn from_parts(
        registry: Arc<JobRegistry>,
        dispatcher: Dispatcher,
        reconciler: Reconciler,
        outcomes: UnboundedReceiver<TaskOutcome>,
        sink: Arc<dyn StateSink>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            registry,
            dispatcher: tokio::sync::Mutex::new(dispatcher),
            reconciler: tokio::sync::Mutex::new(reconciler),
            pending: Mutex::new(VecDeque::new()),
            outcomes: tokio::sync::Mutex::new(outcomes),
            sink,
            max_concurrent_jobs,
        }
    }

    fn pending_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingTask>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a task to the back of the pending queue
    pub fn enqueue(&self, key: TaskKey, command: TaskCommand) {
        debug!("Adding task {} with command {}", key, command);
        self.pending_queue().push_back(PendingTask::new(key, command));
    }

    /// Returns a task handed back by a failed dispatch to the pending queue
    pub fn requeue(&self, task: PendingTask) {
        self.pending_queue().push_back(task);
    }

    pub fn pending_len(&self) -> usize {
        self.pending_queue().len()
    }

    /// Number of jobs dispatched and not yet terminal
    pub fn tracked_len(&self) -> usize {
        self.registry.size()
    }

    /// Jobs currently tracked, in dispatch order
    pub fn running(&self) -> Vec<(JobIdentifier, TaskKey)> {
        self.registry.snapshot()
    }

    /// Number of jobs dispatched since the executor started
    pub async fn dispatched(&self) -> u64 {
        self.dispatcher.lock().await.dispatched()
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Whether nothing is pending and nothing is tracked
    pub fn is_idle(&self) -> bool {
        self.pending_len() == 0 && self.registry.is_empty()
    }

    /// One control loop iteration
    ///
    /// Reports every available outcome to the sink, then dispatches at most
    /// one pending task if the ceiling allows. A failed dispatch hands the
    /// task back inside [`ExecutorError::Dispatch`]; the task is not requeued.
    pub async fn tick(&self) -> Result<Tick, ExecutorError> {
        let reported = self.report_outcomes().await;

        let mut dispatcher = self.dispatcher.lock().await;

        let tracked = self.registry.size();
        if tracked >= self.max_concurrent_jobs {
            debug!(
                "{} job(s) tracked, ceiling is {}; deferring dispatch",
                tracked, self.max_concurrent_jobs
            );
            return Ok(Tick {
                reported,
                step: DispatchStep::AtCapacity,
            });
        }

        let Some(mut task) = self.pending_queue().pop_front() else {
            return Ok(Tick {
                reported,
                step: DispatchStep::Idle,
            });
        };

        if self.registry.contains_task(&task.key) {
            debug!("Task {} still has a live job; deferring", task.key);
            let key = task.key.clone();
            self.requeue(task);
            return Ok(Tick {
                reported,
                step: DispatchStep::Deferred(key),
            });
        }

        task.attempts += 1;
        match dispatcher.dispatch(&task.key, &task.command).await {
            Ok(job_id) => Ok(Tick {
                reported,
                step: DispatchStep::Dispatched(job_id),
            }),
            Err(source) => Err(ExecutorError::Dispatch { task, source }),
        }
    }

    /// Performs one reconciliation pass
    ///
    /// Outcomes it produces are reported on the next [`tick`](Self::tick).
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let reconciler = self.reconciler.lock().await;
        reconciler.reconcile_once().await
    }

    /// Hands every available outcome to the sink, in discovery order
    pub async fn report_outcomes(&self) -> usize {
        let mut outcomes = self.outcomes.lock().await;

        let mut reported = 0;
        while let Ok(outcome) = outcomes.try_recv() {
            info!("Reporting {} for task {}", outcome.state, outcome.key);
            self.sink.report(&outcome.key, outcome.state).await;
            reported += 1;
        }

        reported
    }

    /// Applies a retry policy to a failed dispatch
    ///
    /// The task is requeued while attempts remain; otherwise it is dropped
    /// and reported as failed.
    pub async fn handle_dispatch_failure(&self, err: ExecutorError, policy: RetryPolicy) {
        let ExecutorError::Dispatch { task, source } = err;

        if policy.should_retry(&task) {
            warn!(
                "Dispatch of task {} failed (attempt {}/{}), requeueing: {}",
                task.key, task.attempts, policy.max_attempts, source
            );
            self.requeue(task);
        } else {
            error!(
                "Dropping task {} after {} attempt(s): {}",
                task.key, task.attempts, source
            );
            self.sink.report(&task.key, TerminalState::Failed).await;
        }
    }

    /// Runs until no task is pending and no job is tracked
    ///
    /// Submitted jobs are never cancelled; this waits for each of them to
    /// reach a terminal state.
    pub async fn drain_and_wait(&self, poll_interval: Duration, policy: RetryPolicy) {
        info!(
            "Draining executor: {} pending, {} tracked",
            self.pending_len(),
            self.tracked_len()
        );

        loop {
            self.reconcile_once().await;

            loop {
                match self.tick().await {
                    Ok(Tick {
                        step: DispatchStep::Dispatched(_),
                        ..
                    }) => continue,
                    Ok(_) => break,
                    Err(err) => {
                        self.handle_dispatch_failure(err, policy).await;
                        break;
                    }
                }
            }

            if self.is_idle() {
                break;
            }

            tokio::time::sleep(poll_interval).await;
        }

        self.report_outcomes().await;
        info!("Executor drained after dispatching {} job(s)", self.dispatched().await);
    }
}
