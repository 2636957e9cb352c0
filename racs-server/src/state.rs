//! Shared server state
//!
//! [`AppState`] is the process-wide context handed to HTTP handlers, workers,
//! and the reconciler. The project and registry maps use plain std locks;
//! every critical section is short and none spans an await.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use racs_core::domain::project::{BuildRequest, ProjectCore, QUEUE_DEPTH};
use racs_core::domain::registry::Registry;
use racs_core::domain::state::State;
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::service::events::EventBus;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub projects: RwLock<HashMap<i64, Arc<Project>>>,
    pub registries: Mutex<HashMap<String, Registry>>,
    /// Absolute path of the per-project directory tree.
    pub projects_root: PathBuf,
    /// Absolute path of the per-task log directories.
    pub tasks_root: PathBuf,
    /// Absolute path of the staged-upload directory.
    pub uploads_root: PathBuf,
    /// Treat every request as admin (`--no-login`).
    pub no_login: bool,
}

impl AppState {
    pub fn project(&self, id: i64) -> Option<Arc<Project>> {
        self.projects.read().unwrap().get(&id).cloned()
    }

    pub fn insert_project(&self, project: Arc<Project>) {
        self.projects.write().unwrap().insert(project.id, project);
    }

    pub fn remove_project(&self, id: i64) {
        self.projects.write().unwrap().remove(&id);
    }
}

/// Handle to one live project: its identity, its action queue, and its
/// lock-guarded mutable core. The queue receiver is owned by the project's
/// worker; when the worker exits (DELETE_SUCCESS) sends start failing and
/// are ignored.
pub struct Project {
    pub id: i64,
    queue: mpsc::Sender<BuildRequest>,
    pub core: Mutex<ProjectCore>,
}

impl Project {
    /// Wrap a core in a handle, returning the queue receiver for the worker.
    pub fn new(id: i64, core: ProjectCore) -> (Arc<Project>, mpsc::Receiver<BuildRequest>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let project = Arc::new(Project {
            id,
            queue: tx,
            core: Mutex::new(core),
        });
        (project, rx)
    }

    /// Enqueue a stage request. Blocks while the queue is full; that
    /// blocking is the admission control for cascades and triggers.
    pub async fn enqueue(&self, stage: State, trigger: String) {
        if self.queue.send(BuildRequest { stage, trigger }).await.is_err() {
            tracing::debug!("Project {} queue closed, dropping {}", self.id, stage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_core() -> ProjectCore {
        ProjectCore::created(
            "demo".into(),
            "https://example/git".into(),
            "main".into(),
            "".into(),
            "demo:$VERSION".into(),
        )
    }

    #[tokio::test]
    async fn test_enqueue_delivers_in_order() {
        let (project, mut rx) = Project::new(1, demo_core());
        project.enqueue(State::Cleaning, String::new()).await;
        project.enqueue(State::Building, "v1".into()).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stage, State::Cleaning);
        assert_eq!(first.trigger, "");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.stage, State::Building);
        assert_eq!(second.trigger, "v1");
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_exit_is_ignored() {
        let (project, rx) = Project::new(1, demo_core());
        drop(rx);
        // Must not panic or block.
        project.enqueue(State::Cleaning, String::new()).await;
    }
}
