//! Kubexec Runner
//!
//! A bounded-concurrency executor that runs scheduler tasks as cluster jobs.
//!
//! Architecture:
//! - Registry: which job runs which task, shared by all workers
//! - Dispatcher: names, builds and submits one job per task
//! - Reconciler: polls tracked jobs and settles terminal ones
//! - Executor: the control loop enforcing the concurrency ceiling
//! - Gateway: the cluster, behind a trait
//! - Sink: where terminal task states are reported
//! - Scheduler: timers driving the executor
//!
//! Terminal outcomes are reported exactly once per dispatched task.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod sink;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use executor::{DispatchStep, ExecutorLoop, PendingTask, RetryPolicy, Tick};
pub use gateway::{ClusterJobGateway, KubernetesGateway};
pub use sink::{StateSink, TracingStateSink};
