//! Job domain types

use serde::{Deserialize, Serialize};

use crate::domain::task::TaskKey;

/// Maximum length of a cluster resource name
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Name of a job resource in the cluster
///
/// Built from the task key prefix, the executor's submission counter and the
/// submission time, so two live jobs of one executor never share a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobIdentifier(String);

impl JobIdentifier {
    /// Derives a job name from a task key
    ///
    /// Joins the first two key components (whitespace replaced by hyphens),
    /// the counter and the epoch seconds with hyphens, then maps underscores
    /// to hyphens. No truncation is performed.
    pub fn generate(key: &TaskKey, counter: u64, now_epoch: i64) -> Self {
        let prefix = [key.dag_id.as_str(), key.task_id.as_str()]
            .iter()
            .map(|part| hyphenate_whitespace(part))
            .collect::<Vec<_>>()
            .join("-");

        let name = format!("{}-{}-{}", prefix, counter, now_epoch).replace('_', "-");
        Self(name)
    }

    /// Wraps a name reported by the cluster
    pub fn from_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is longer than the cluster accepts
    pub fn exceeds_name_limit(&self) -> bool {
        self.0.len() > MAX_JOB_NAME_LEN
    }
}

impl std::fmt::Display for JobIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hyphenate_whitespace(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

/// Job status as classified from the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalJobStatus {
    /// Running, pending, or any state the cluster did not report as terminal
    Active,
    Succeeded,
    Failed,
}

impl ExternalJobStatus {
    /// Terminal state for this status, if any
    pub fn terminal(self) -> Option<TerminalState> {
        match self {
            ExternalJobStatus::Active => None,
            ExternalJobStatus::Succeeded => Some(TerminalState::Succeeded),
            ExternalJobStatus::Failed => Some(TerminalState::Failed),
        }
    }
}

/// Final state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalState {
    Succeeded,
    Failed,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Succeeded => write!(f, "success"),
            TerminalState::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal outcome of one task lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub key: TaskKey,
    pub state: TerminalState,
}

impl TaskOutcome {
    pub fn new(key: TaskKey, state: TerminalState) -> Self {
        Self { key, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(dag: &str, task: &str) -> TaskKey {
        TaskKey::new(dag, task, "2024-01-01T00:00:00".parse().unwrap())
    }

    #[test]
    fn test_generate_joins_prefix_counter_and_epoch() {
        let id = JobIdentifier::generate(&key("dagA", "taskX"), 1, 1_704_067_200);
        assert_eq!(id.as_str(), "dagA-taskX-1-1704067200");
    }

    #[test]
    fn test_generate_replaces_whitespace_and_underscores() {
        let id = JobIdentifier::generate(&key("my dag", "load_table\tv2"), 7, 42);
        assert_eq!(id.as_str(), "my-dag-load-table-v2-7-42");
    }

    #[test]
    fn test_generate_ignores_execution_date() {
        let a = TaskKey::new("d", "t", "2024-01-01T00:00:00".parse().unwrap());
        let b = TaskKey::new("d", "t", "2025-06-30T12:00:00".parse().unwrap());
        assert_eq!(
            JobIdentifier::generate(&a, 3, 100),
            JobIdentifier::generate(&b, 3, 100)
        );
    }

    #[test]
    fn test_counter_separates_same_second_submissions() {
        let k = key("dagA", "taskX");
        assert_ne!(
            JobIdentifier::generate(&k, 1, 100),
            JobIdentifier::generate(&k, 2, 100)
        );
    }

    #[test]
    fn test_name_limit() {
        let short = JobIdentifier::generate(&key("d", "t"), 1, 1);
        assert!(!short.exceeds_name_limit());

        let long = JobIdentifier::generate(&key(&"d".repeat(40), &"t".repeat(40)), 1, 1);
        assert!(long.exceeds_name_limit());
    }

    #[test]
    fn test_terminal_classification() {
        assert_eq!(ExternalJobStatus::Active.terminal(), None);
        assert_eq!(
            ExternalJobStatus::Succeeded.terminal(),
            Some(TerminalState::Succeeded)
        );
        assert_eq!(
            ExternalJobStatus::Failed.terminal(),
            Some(TerminalState::Failed)
        );
    }
}
