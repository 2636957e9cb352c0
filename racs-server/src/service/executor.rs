//! Child-process execution and log capture
//!
//! Runs one planned action with stdout and stderr redirected into the
//! task's log file. The first bytes of every log are the command line in
//! bold ANSI, so the browser's log view shows what actually ran.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::service::action::Action;

/// Execute `action` for task `task_id`, capturing output under
/// `tasks_root/{task_id}/out.log`. Returns whether the child exited
/// successfully; spawn failures count as command failures.
pub async fn run(tasks_root: &Path, task_id: i64, action: &Action) -> bool {
    let task_dir = tasks_root.join(task_id.to_string());
    if let Err(err) = std::fs::create_dir_all(&task_dir) {
        warn!("Task {}: cannot create {}: {}", task_id, task_dir.display(), err);
        return false;
    }

    let log_path = task_dir.join("out.log");
    let mut log = match std::fs::File::create(&log_path) {
        Ok(file) => file,
        Err(err) => {
            warn!("Task {}: cannot create {}: {}", task_id, log_path.display(), err);
            return false;
        }
    };

    if let Err(err) = write!(log, "\u{1b}[1m{}\u{1b}[0m\n", action.command_line()) {
        warn!("Task {}: cannot write log header: {}", task_id, err);
        return false;
    }

    let stdout = match log.try_clone() {
        Ok(file) => file,
        Err(err) => {
            warn!("Task {}: cannot clone log handle: {}", task_id, err);
            return false;
        }
    };

    info!("Task {} running {}", task_id, action.command_line());

    let status = Command::new(&action.program)
        .args(&action.args)
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(log))
        .status()
        .await;

    match status {
        Ok(status) => status.success(),
        Err(err) => {
            warn!("Task {}: spawn failed: {}", task_id, err);
            false
        }
    }
}
