//! Task domain types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Composite identifier of a task instance
///
/// Supplied by the calling scheduler and never mutated. The first two
/// components are embedded into the cluster job name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub dag_id: String,
    pub task_id: String,
    pub execution_date: NaiveDateTime,
}

impl TaskKey {
    /// Creates a new task key
    pub fn new(
        dag_id: impl Into<String>,
        task_id: impl Into<String>,
        execution_date: NaiveDateTime,
    ) -> Self {
        Self {
            dag_id: dag_id.into(),
            task_id: task_id.into(),
            execution_date,
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.dag_id,
            self.task_id,
            self.execution_date.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

/// Command associated with a task at enqueue time
///
/// Opaque to the executor apart from whitespace tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskCommand(String);

impl TaskCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the command on whitespace
    pub fn tokens(&self) -> Vec<&str> {
        self.0.split_whitespace().collect()
    }

    /// Builds the container invocation for this command
    ///
    /// The first token names the scheduler's own program and is replaced by
    /// `entrypoint`; `trailing` is appended after the remaining tokens.
    pub fn container_args(&self, entrypoint: &str, trailing: &[String]) -> Vec<String> {
        std::iter::once(entrypoint.to_string())
            .chain(self.tokens().into_iter().skip(1).map(str::to_string))
            .chain(trailing.iter().cloned())
            .collect()
    }
}

impl From<&str> for TaskCommand {
    fn from(command: &str) -> Self {
        Self::new(command)
    }
}

impl From<String> for TaskCommand {
    fn from(command: String) -> Self {
        Self(command)
    }
}

impl std::fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
