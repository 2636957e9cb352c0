//! Task records
//!
//! One task is created per executed pipeline action. Its lifecycle state
//! transitions exactly once, from RUNNING to either SUCCESS or ERROR.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn name(self) -> &'static str {
        match self {
            TaskState::Running => "RUNNING",
            TaskState::Success => "SUCCESS",
            TaskState::Error => "ERROR",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskState {
    type Err = ();

    fn from_str(s: &str) -> Result<TaskState, ()> {
        match s {
            "RUNNING" => Ok(TaskState::Running),
            "SUCCESS" => Ok(TaskState::Success),
            "ERROR" => Ok(TaskState::Error),
            _ => Err(()),
        }
    }
}

/// One executed (or executing) pipeline action.
///
/// `kind` is the string form of the state whose action produced the task,
/// e.g. `CLONING`. `time` is the store-assigned creation timestamp. The
/// serialized form matches the task objects on the event wire.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: TaskState,
    pub time: String,
}
