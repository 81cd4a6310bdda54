//! Scheduler layer for the executor
//!
//! Runs the executor loop on timers: one worker dispatches pending tasks,
//! another polls the jobs already in the cluster.

pub mod poller;

pub use poller::ExecutorPoller;
