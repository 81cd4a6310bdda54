//! Executor poller
//!
//! Drives an [`ExecutorLoop`] on two independent cadences: a dispatch worker
//! that ticks the loop and a reconcile worker that polls tracked jobs. Both
//! run until the shutdown future resolves. The reconcile worker finishes
//! the pass it is in before stopping; jobs already submitted keep running
//! in the cluster.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::executor::{DispatchStep, ExecutorLoop, RetryPolicy};

/// Runs the dispatch and reconcile workers of one executor
pub struct ExecutorPoller {
    executor: Arc<ExecutorLoop>,
    dispatch_interval: Duration,
    reconcile_interval: Duration,
    policy: RetryPolicy,
}

impl ExecutorPoller {
    /// Creates a new poller
    pub fn new(executor: Arc<ExecutorLoop>, config: &Config) -> Self {
        Self {
            executor,
            dispatch_interval: config.dispatch_interval,
            reconcile_interval: config.reconcile_interval,
            policy: RetryPolicy::new(config.max_dispatch_attempts),
        }
    }

    /// Runs both workers until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        info!(
            "Starting executor poller (dispatch every {:?}, reconcile every {:?}, ceiling {})",
            self.dispatch_interval,
            self.reconcile_interval,
            self.executor.max_concurrent_jobs()
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let reconcile_handle = self.start_reconcile_loop(stop_rx);

        let mut ticker = time::interval(self.dispatch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let dispatched = self.dispatch_cycle().await;
                    if dispatched > 0 {
                        info!(
                            "Dispatched {} job(s) this cycle ({} tracked, {} pending)",
                            dispatched,
                            self.executor.tracked_len(),
                            self.executor.pending_len()
                        );
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        if let Err(e) = reconcile_handle.await {
            error!("Reconcile worker ended abnormally: {}", e);
        }
        self.executor.report_outcomes().await;

        info!(
            "Executor poller stopped with {} job(s) still running and {} task(s) pending",
            self.executor.tracked_len(),
            self.executor.pending_len()
        );
    }

    /// Ticks until nothing more can be dispatched this cycle
    async fn dispatch_cycle(&self) -> usize {
        let mut dispatched = 0;

        loop {
            match self.executor.tick().await {
                Ok(tick) => match tick.step {
                    DispatchStep::Dispatched(_) => dispatched += 1,
                    DispatchStep::AtCapacity => {
                        debug!("Ceiling reached, waiting for running jobs");
                        break;
                    }
                    DispatchStep::Idle | DispatchStep::Deferred(_) => break,
                },
                Err(err) => {
                    self.executor.handle_dispatch_failure(err, self.policy).await;
                    break;
                }
            }
        }

        dispatched
    }

    /// Starts the reconcile worker
    ///
    /// The worker stops once `stop` turns true or its sender is dropped,
    /// never in the middle of a pass.
    fn start_reconcile_loop(
        &self,
        mut stop: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        let interval = self.reconcile_interval;

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }

                debug!("Polling {} tracked job(s)", executor.tracked_len());
                let report = executor.reconcile_once().await;
                if report.terminal() > 0 {
                    info!(
                        "{} job(s) finished: {} succeeded, {} failed",
                        report.terminal(),
                        report.succeeded,
                        report.failed
                    );
                }
            }

            debug!("Reconcile worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, ScriptedGateway, key, template};
    use kubexec_core::domain::job::{ExternalJobStatus, TerminalState};
    use kubexec_core::domain::task::TaskCommand;

    fn poller(
        ceiling: usize,
    ) -> (ExecutorPoller, Arc<ExecutorLoop>, Arc<ScriptedGateway>, Arc<RecordingSink>) {
        let gateway = Arc::new(ScriptedGateway::new());
        let sink = Arc::new(RecordingSink::new());
        let executor = Arc::new(ExecutorLoop::new(
            gateway.clone(),
            sink.clone(),
            template(),
            ceiling,
        ));

        let mut config = Config::default();
        config.dispatch_interval = Duration::from_millis(5);
        config.reconcile_interval = Duration::from_millis(5);
        config.max_dispatch_attempts = 2;

        let poller = ExecutorPoller::new(Arc::clone(&executor), &config);
        (poller, executor, gateway, sink)
    }

    #[tokio::test]
    async fn test_dispatch_cycle_fills_to_ceiling() {
        let (poller, executor, _gateway, _sink) = poller(2);
        for i in 0..5 {
            executor.enqueue(key(&format!("t{}", i)), TaskCommand::new("run.sh"));
        }

        assert_eq!(poller.dispatch_cycle().await, 2);
        assert_eq!(executor.tracked_len(), 2);
        assert_eq!(executor.pending_len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_cycle_requeues_failed_task() {
        let (poller, executor, gateway, sink) = poller(2);
        gateway.fail_next_submits(1);
        executor.enqueue(key("t"), TaskCommand::new("run.sh"));

        assert_eq!(poller.dispatch_cycle().await, 0);
        assert_eq!(executor.pending_len(), 1);

        assert_eq!(poller.dispatch_cycle().await, 1);
        assert!(sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_tasks_until_shutdown() {
        let (poller, executor, gateway, sink) = poller(2);
        gateway.set_default_status(ExternalJobStatus::Succeeded);
        for i in 0..4 {
            executor.enqueue(key(&format!("t{}", i)), TaskCommand::new("run.sh"));
        }

        let watched = Arc::clone(&executor);
        let shutdown = async move {
            while !watched.is_idle() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(Duration::from_secs(5), poller.run(shutdown))
            .await
            .unwrap();

        let reports = sink.reports();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|(_, s)| *s == TerminalState::Succeeded));
    }

    #[tokio::test]
    async fn test_run_deletes_every_failed_job_before_returning() {
        let (poller, executor, gateway, sink) = poller(3);
        gateway.set_default_status(ExternalJobStatus::Failed);
        for i in 0..3 {
            executor.enqueue(key(&format!("t{}", i)), TaskCommand::new("run.sh"));
        }

        let watched = Arc::clone(&executor);
        let shutdown = async move {
            while !watched.is_idle() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(Duration::from_secs(5), poller.run(shutdown))
            .await
            .unwrap();

        assert_eq!(sink.reports().len(), 3);
        assert_eq!(gateway.deleted().len(), 3);
    }

    #[tokio::test]
    async fn test_reconcile_worker_stops_on_signal() {
        let (poller, executor, gateway, _sink) = poller(1);
        executor.enqueue(key("t"), TaskCommand::new("run.sh"));
        poller.dispatch_cycle().await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = poller.start_reconcile_loop(stop_rx);

        let job_id = executor.running()[0].0.clone();
        while gateway.status_calls(&job_id) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(executor.tracked_len(), 1);
    }
}
