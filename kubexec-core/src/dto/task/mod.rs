//! Task submission DTOs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::task::{TaskCommand, TaskKey};

/// A task handed to the executor by a scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub dag_id: String,
    pub task_id: String,
    pub execution_date: NaiveDateTime,
    pub command: String,
}

impl TaskSubmission {
    /// Splits the submission into its key and command
    pub fn into_parts(self) -> (TaskKey, TaskCommand) {
        (
            TaskKey::new(self.dag_id, self.task_id, self.execution_date),
            TaskCommand::new(self.command),
        )
    }
}
