//! State sink
//!
//! The boundary back to the calling scheduler. The executor reports every
//! terminal task outcome through exactly one [`StateSink::report`] call.

use async_trait::async_trait;
use kubexec_core::domain::job::TerminalState;
use kubexec_core::domain::task::TaskKey;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Receiver of terminal task states
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Records the terminal state of a task
    async fn report(&self, key: &TaskKey, state: TerminalState);
}

/// Sink that logs outcomes and keeps a tally
#[derive(Default)]
pub struct TracingStateSink {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl TracingStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StateSink for TracingStateSink {
    async fn report(&self, key: &TaskKey, state: TerminalState) {
        match state {
            TerminalState::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                info!("Setting state of {} to {}", key, state);
            }
            TerminalState::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Setting state of {} to {}", key, state);
            }
        }
    }
}
