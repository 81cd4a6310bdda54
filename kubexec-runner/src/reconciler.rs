//! Reconciler
//!
//! Polls every tracked job once per pass and settles the ones that reached
//! a terminal state. A terminal job is removed from the registry before its
//! outcome is emitted, so an outcome can only be emitted once.

use std::sync::Arc;

use kubexec_core::domain::job::{JobIdentifier, TaskOutcome, TerminalState};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::gateway::ClusterJobGateway;
use crate::registry::JobRegistry;

/// Summary of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub polled: usize,
    pub active: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs whose status could not be read; they are retried next pass
    pub poll_errors: usize,
    /// Failed jobs whose resource could not be deleted
    pub delete_errors: usize,
}

impl ReconcileReport {
    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Settles tracked jobs
pub struct Reconciler {
    registry: Arc<JobRegistry>,
    gateway: Arc<dyn ClusterJobGateway>,
    outcomes: UnboundedSender<TaskOutcome>,
}

impl Reconciler {
    /// Creates a new reconciler
    ///
    /// # Arguments
    /// * `registry` - Registry shared with the dispatcher
    /// * `gateway` - Cluster the jobs run in
    /// * `outcomes` - Channel terminal outcomes are emitted on
    pub fn new(
        registry: Arc<JobRegistry>,
        gateway: Arc<dyn ClusterJobGateway>,
        outcomes: UnboundedSender<TaskOutcome>,
    ) -> Self {
        Self {
            registry,
            gateway,
            outcomes,
        }
    }

    /// Performs one full poll pass over a registry snapshot
    ///
    /// Failures are isolated per job: a failed status read skips that job
    /// until the next pass, and a failed delete never holds back the outcome.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (job_id, key) in self.registry.snapshot() {
            report.polled += 1;

            let status = match self.gateway.status(&job_id).await {
                Ok(status) => status,
                Err(e) if e.is_not_found() => {
                    error!(
                        "Job {} for task {} is gone from the cluster; it stays tracked: {}",
                        job_id, key, e
                    );
                    report.poll_errors += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Skipping job {} for task {} this pass: {}", job_id, key, e);
                    report.poll_errors += 1;
                    continue;
                }
            };

            let Some(state) = status.terminal() else {
                debug!("Job {} for task {} is running", job_id, key);
                report.active += 1;
                continue;
            };

            info!("Job {} for task {} reached {}", job_id, key, state);
            if !self.settle(&job_id, state) {
                continue;
            }

            match state {
                TerminalState::Succeeded => report.succeeded += 1,
                TerminalState::Failed => {
                    report.failed += 1;
                    if let Err(e) = self.gateway.delete(&job_id).await {
                        warn!("Failed to delete failed job {}: {}", job_id, e);
                        report.delete_errors += 1;
                    }
                }
            }
        }

        if report.polled > 0 {
            debug!(
                "Reconciled {} job(s): {} active, {} succeeded, {} failed, {} unreadable",
                report.polled, report.active, report.succeeded, report.failed, report.poll_errors
            );
        }

        report
    }

    /// Removes a terminal job and emits its outcome
    ///
    /// Returns false if the job was no longer tracked.
    fn settle(&self, job_id: &JobIdentifier, state: TerminalState) -> bool {
        let key = match self.registry.remove(job_id) {
            Ok(key) => key,
            Err(e) => {
                error!("Job {} reached {} but could not be settled: {}", job_id, state, e);
                return false;
            }
        };

        if self.outcomes.send(TaskOutcome::new(key, state)).is_err() {
            error!(
                "Outcome channel closed; {} outcome of job {} was not delivered",
                state, job_id
            );
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGateway, key};
    use kubexec_core::domain::job::ExternalJobStatus;
    use kubexec_core::domain::task::TaskKey;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Fixture {
        gateway: Arc<ScriptedGateway>,
        registry: Arc<JobRegistry>,
        reconciler: Reconciler,
        outcomes: UnboundedReceiver<TaskOutcome>,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(ScriptedGateway::new());
        let registry = Arc::new(JobRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new(Arc::clone(&registry), gateway.clone(), tx);
        Fixture {
            gateway,
            registry,
            reconciler,
            outcomes: rx,
        }
    }

    fn track(f: &Fixture, name: &str, task: &str) -> (JobIdentifier, TaskKey) {
        let job_id = JobIdentifier::from_name(name);
        f.registry.add(job_id.clone(), key(task)).unwrap();
        (job_id, key(task))
    }

    fn drain(rx: &mut UnboundedReceiver<TaskOutcome>) -> Vec<TaskOutcome> {
        let mut out = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            out.push(outcome);
        }
        out
    }

    #[tokio::test]
    async fn test_active_job_stays_tracked_across_passes() {
        let mut f = fixture();
        let (job_id, _) = track(&f, "j1", "a");

        for _ in 0..5 {
            let report = f.reconciler.reconcile_once().await;
            assert_eq!(report.active, 1);
            assert_eq!(report.terminal(), 0);
        }

        assert_eq!(f.registry.size(), 1);
        assert!(drain(&mut f.outcomes).is_empty());
        assert_eq!(f.gateway.status_calls(&job_id), 5);
    }

    #[tokio::test]
    async fn test_failed_job_is_removed_deleted_and_reported_once() {
        let mut f = fixture();
        let (job_id, k) = track(&f, "j1", "a");
        f.gateway.set_status(&job_id, ExternalJobStatus::Failed);

        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.failed, 1);
        assert!(f.registry.is_empty());
        assert_eq!(f.gateway.deleted(), vec![job_id.clone()]);
        assert_eq!(
            drain(&mut f.outcomes),
            vec![TaskOutcome::new(k, TerminalState::Failed)]
        );

        // A second pass has nothing left to settle
        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.polled, 0);
        assert!(drain(&mut f.outcomes).is_empty());
        assert_eq!(f.gateway.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_succeeded_job_is_removed_without_delete() {
        let mut f = fixture();
        let (job_id, k) = track(&f, "j1", "a");
        f.gateway.set_status(&job_id, ExternalJobStatus::Succeeded);

        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.succeeded, 1);
        assert!(f.registry.is_empty());
        assert!(f.gateway.deleted().is_empty());
        assert_eq!(
            drain(&mut f.outcomes),
            vec![TaskOutcome::new(k, TerminalState::Succeeded)]
        );
    }

    #[tokio::test]
    async fn test_poll_error_skips_only_that_job() {
        let mut f = fixture();
        let (broken, broken_key) = track(&f, "j1", "a");
        let (done, done_key) = track(&f, "j2", "b");
        f.gateway.fail_next_status(&broken);
        f.gateway.set_status(&broken, ExternalJobStatus::Succeeded);
        f.gateway.set_status(&done, ExternalJobStatus::Succeeded);

        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.poll_errors, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.registry.snapshot(), vec![(broken.clone(), broken_key.clone())]);
        assert_eq!(
            drain(&mut f.outcomes),
            vec![TaskOutcome::new(done_key, TerminalState::Succeeded)]
        );

        // Retried on the next pass
        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.succeeded, 1);
        assert!(f.registry.is_empty());
        assert_eq!(
            drain(&mut f.outcomes),
            vec![TaskOutcome::new(broken_key, TerminalState::Succeeded)]
        );
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_block_outcome() {
        let mut f = fixture();
        let (job_id, k) = track(&f, "j1", "a");
        f.gateway.set_status(&job_id, ExternalJobStatus::Failed);
        f.gateway.fail_deletes(true);

        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.delete_errors, 1);
        assert!(f.registry.is_empty());
        assert_eq!(
            drain(&mut f.outcomes),
            vec![TaskOutcome::new(k, TerminalState::Failed)]
        );
    }

    #[tokio::test]
    async fn test_outcomes_follow_snapshot_order() {
        let mut f = fixture();
        for (name, task) in [("j1", "a"), ("j2", "b"), ("j3", "c")] {
            let (job_id, _) = track(&f, name, task);
            f.gateway.set_status(&job_id, ExternalJobStatus::Failed);
        }
        f.gateway
            .set_status(&JobIdentifier::from_name("j2"), ExternalJobStatus::Succeeded);

        f.reconciler.reconcile_once().await;

        let tasks: Vec<_> = drain(&mut f.outcomes)
            .into_iter()
            .map(|o| (o.key.task_id, o.state))
            .collect();
        assert_eq!(
            tasks,
            vec![
                ("a".to_string(), TerminalState::Failed),
                ("b".to_string(), TerminalState::Succeeded),
                ("c".to_string(), TerminalState::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn test_job_removed_mid_pass_is_not_reported() {
        let mut f = fixture();
        let (job_id, _) = track(&f, "j1", "a");
        f.gateway.set_status(&job_id, ExternalJobStatus::Failed);
        f.gateway.remove_on_status(&job_id, Arc::clone(&f.registry));

        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.failed, 0);
        assert!(drain(&mut f.outcomes).is_empty());
        assert!(f.gateway.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_job_stays_tracked_without_outcome() {
        let mut f = fixture();
        let (gone, gone_key) = track(&f, "j1", "a");
        let (done, _) = track(&f, "j2", "b");
        f.gateway.vanish(&gone);
        f.gateway.set_status(&done, ExternalJobStatus::Succeeded);

        let report = f.reconciler.reconcile_once().await;
        assert_eq!(report.poll_errors, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.registry.snapshot(), vec![(gone, gone_key)]);
        assert_eq!(drain(&mut f.outcomes).len(), 1);
    }
}
