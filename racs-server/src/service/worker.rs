//! Per-project worker
//!
//! One worker task owns each project's pipeline. It drains the action queue
//! in order, runs at most one child at a time, advances the state ladder by
//! the outcome (+1 error, +2 success), persists every transition, emits the
//! matching events, and applies the cascade that chains the stages together.

use std::sync::Arc;

use racs_core::domain::project::BuildRequest;
use racs_core::domain::state::State;
use racs_core::domain::task::{TaskRecord, TaskState};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::repository::{project_repository, task_repository};
use crate::service::{action, executor, registry};
use crate::state::{Project, SharedState};

/// What the cascade does after an action settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cascade {
    /// Chain straight into the next stage.
    Enqueue(State),
    /// PULL finished: re-hash the build spec to pick PREPARING or BUILDING.
    CheckBuildSpec,
    /// PACKAGE finished: bump the version, then push.
    BumpVersion,
    /// PUSH finished: fan out to downstream projects.
    FireTriggers,
    /// DELETE finished: drop the project and stop the worker.
    Teardown,
    /// Error outcome or quiescent state: wait for the user.
    Halt,
}

fn cascade(outcome: State) -> Cascade {
    match outcome {
        State::CreateSuccess => Cascade::Enqueue(State::Cleaning),
        State::CleanSuccess => Cascade::Enqueue(State::Cloning),
        State::CloneSuccess => Cascade::Enqueue(State::Preparing),
        State::PrepareSuccess => Cascade::Enqueue(State::Pulling),
        State::PullSuccess => Cascade::CheckBuildSpec,
        State::BuildSuccess => Cascade::Enqueue(State::Packaging),
        State::PackageSuccess => Cascade::BumpVersion,
        State::PushSuccess => Cascade::FireTriggers,
        State::DeleteSuccess => Cascade::Teardown,
        _ => Cascade::Halt,
    }
}

/// Spawn the worker owning `project`. The worker exits when the project is
/// deleted or every queue handle is gone.
pub fn spawn(
    state: SharedState,
    project: Arc<Project>,
    requests: mpsc::Receiver<BuildRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state, project, requests))
}

async fn run(state: SharedState, project: Arc<Project>, mut requests: mpsc::Receiver<BuildRequest>) {
    loop {
        info!("Project {} waiting for work", project.id);
        let Some(request) = requests.recv().await else {
            return;
        };
        let stage = request.stage;
        let trigger = request.trigger;
        info!("Project {} received {}", project.id, stage);

        // PUSH resolves its destination first; the login refresh may run a
        // child of its own and must not happen under the core lock.
        let registry_url = if stage == State::Pushing {
            let destination = project.core.lock().unwrap().destination.clone();
            registry::login(&state, &destination).await
        } else {
            None
        };

        let planned = {
            let mut core = project.core.lock().unwrap();
            core.state = stage;
            action::plan(
                stage,
                project.id,
                &core,
                &state.projects_root,
                &trigger,
                registry_url.as_deref(),
            )
        };
        // Persist the RUNNING state before the child starts, so a crashed
        // server restarts with the stage it died in.
        if let Err(err) = project_repository::update_state(&state.pool, project.id, stage).await {
            warn!("Project {}: state update failed: {}", project.id, err);
        }

        if let Some(planned) = planned {
            execute(&state, &project, stage, &planned).await;
        }

        info!("Project {} finished {}", project.id, stage);

        let outcome = project.core.lock().unwrap().state;
        match cascade(outcome) {
            Cascade::Enqueue(next) => project.enqueue(next, trigger).await,
            Cascade::CheckBuildSpec => {
                let next = pull_follow_up(&state, &project).await;
                project.enqueue(next, trigger).await;
            }
            Cascade::BumpVersion => {
                let version = {
                    let mut core = project.core.lock().unwrap();
                    core.version += 1;
                    core.version
                };
                if let Err(err) =
                    project_repository::update_version(&state.pool, project.id, version).await
                {
                    warn!("Project {}: version update failed: {}", project.id, err);
                }
                state
                    .bus
                    .publish(json!({
                        "event": "project/version",
                        "id": project.id,
                        "version": version,
                    }))
                    .await;
                project.enqueue(State::Pushing, trigger).await;
            }
            Cascade::FireTriggers => {
                let (tag, edges) = {
                    let core = project.core.lock().unwrap();
                    let edges: Vec<(i64, State)> =
                        core.triggers.iter().map(|(t, s)| (*t, *s)).collect();
                    (core.rendered_tag(), edges)
                };
                for (target_id, target_stage) in edges {
                    let Some(target) = state.project(target_id) else {
                        continue;
                    };
                    target.enqueue(target_stage, tag.clone()).await;
                }
            }
            Cascade::Teardown => {
                if let Err(err) = project_repository::delete(&state.pool, project.id).await {
                    warn!("Project {}: row delete failed: {}", project.id, err);
                }
                if let Err(err) = task_repository::delete_for_project(&state.pool, project.id).await
                {
                    warn!("Project {}: task delete failed: {}", project.id, err);
                }
                state.remove_project(project.id);
                info!("Project {} deleted", project.id);
                return;
            }
            Cascade::Halt => {}
        }
    }
}

/// Run one external action: task row, log capture, outcome bookkeeping.
async fn execute(state: &SharedState, project: &Arc<Project>, stage: State, planned: &action::Action) {
    let (task_id, time) = match task_repository::create(&state.pool, project.id, stage.name()).await
    {
        Ok(row) => row,
        Err(err) => {
            // Without a store-assigned task id the pipeline bookkeeping is
            // broken beyond repair for every project.
            error!("Project {}: task insert failed: {}", project.id, err);
            std::process::exit(1);
        }
    };
    info!("Creating task {}:{}", project.id, task_id);

    {
        let mut core = project.core.lock().unwrap();
        core.push_task(TaskRecord {
            id: task_id,
            kind: stage.name().to_string(),
            state: TaskState::Running,
            time: time.clone(),
        });
    }
    state
        .bus
        .publish(json!({
            "event": "task/create",
            "project": project.id,
            "id": task_id,
            "type": stage.name(),
            "time": time,
            "state": TaskState::Running.name(),
        }))
        .await;

    let success = executor::run(&state.tasks_root, task_id, planned).await;
    let task_state = if success { TaskState::Success } else { TaskState::Error };
    let outcome = stage.completed(success);

    {
        let mut core = project.core.lock().unwrap();
        core.state = outcome;
        if let Some(task) = core.tasks.iter_mut().find(|t| t.id == task_id) {
            task.state = task_state;
        }
    }
    info!("Task {} completed", task_id);

    if let Err(err) = project_repository::update_state(&state.pool, project.id, outcome).await {
        warn!("Project {}: state update failed: {}", project.id, err);
    }
    if let Err(err) = task_repository::update_state(&state.pool, task_id, task_state).await {
        warn!("Task {}: state update failed: {}", task_id, err);
    }

    state
        .bus
        .publish(json!({
            "event": "project/state",
            "id": project.id,
            "state": outcome.name(),
        }))
        .await;
    state
        .bus
        .publish(json!({
            "event": "task/state",
            "project": project.id,
            "id": task_id,
            "state": task_state.name(),
        }))
        .await;
}

/// After PULL_SUCCESS: hash the build spec and force a re-prepare when the
/// recipe changed since the last successful pull.
async fn pull_follow_up(state: &SharedState, project: &Arc<Project>) -> State {
    let spec_path = {
        let core = project.core.lock().unwrap();
        state
            .projects_root
            .join(project.id.to_string())
            .join(&core.build_spec)
    };

    let hash = match tokio::fs::read(&spec_path).await {
        Ok(bytes) => Sha256::digest(&bytes).to_vec(),
        Err(err) => {
            warn!("Project {}: cannot hash {}: {}", project.id, spec_path.display(), err);
            Vec::new()
        }
    };

    let changed = {
        let mut core = project.core.lock().unwrap();
        if core.build_hash != hash {
            core.build_hash = hash.clone();
            true
        } else {
            false
        }
    };

    if changed {
        if let Err(err) = project_repository::update_build_hash(&state.pool, project.id, &hash).await
        {
            warn!("Project {}: build hash update failed: {}", project.id, err);
        }
        State::Preparing
    } else {
        State::Building
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::service::events::EventBus;
    use racs_core::domain::project::ProjectCore;
    use std::collections::HashMap;
    use std::sync::{Mutex, RwLock};
    use std::time::Duration;

    #[test]
    fn test_cascade_success_chain() {
        assert_eq!(cascade(State::CreateSuccess), Cascade::Enqueue(State::Cleaning));
        assert_eq!(cascade(State::CleanSuccess), Cascade::Enqueue(State::Cloning));
        assert_eq!(cascade(State::CloneSuccess), Cascade::Enqueue(State::Preparing));
        assert_eq!(cascade(State::PrepareSuccess), Cascade::Enqueue(State::Pulling));
        assert_eq!(cascade(State::PullSuccess), Cascade::CheckBuildSpec);
        assert_eq!(cascade(State::BuildSuccess), Cascade::Enqueue(State::Packaging));
        assert_eq!(cascade(State::PackageSuccess), Cascade::BumpVersion);
        assert_eq!(cascade(State::PushSuccess), Cascade::FireTriggers);
        assert_eq!(cascade(State::DeleteSuccess), Cascade::Teardown);
    }

    #[test]
    fn test_cascade_halts_on_errors_and_running_states() {
        for state in [
            State::None,
            State::CleanError,
            State::CloneError,
            State::PrepareError,
            State::PullError,
            State::BuildError,
            State::PackageError,
            State::PushError,
            State::DeleteError,
            State::Building,
            State::Cloning,
        ] {
            assert_eq!(cascade(state), Cascade::Halt, "{state}");
        }
    }

    struct Fixture {
        state: SharedState,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(crate::state::AppState {
            pool: db::test_pool().await,
            bus: EventBus::start(),
            projects: RwLock::new(HashMap::new()),
            registries: Mutex::new(HashMap::new()),
            projects_root: dir.path().join("projects"),
            tasks_root: dir.path().join("tasks"),
            uploads_root: dir.path().join("uploads"),
            no_login: true,
        });
        Fixture { state, _dir: dir }
    }

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
    async fn test_delete_runs_teardown_and_stops_worker() {
        let fixture = fixture().await;
        let state = &fixture.state;
        let id = project_repository::create(&state.pool, "demo", "u", "main", "", "t")
            .await
            .unwrap();
        let (_task, _) = task_repository::create(&state.pool, id, "CLONING").await.unwrap();

        let project_dir = state.projects_root.join(id.to_string());
        std::fs::create_dir_all(project_dir.join("workspace")).unwrap();
        std::fs::write(project_dir.join("BuildSpec"), "FROM scratch").unwrap();

        let (project, requests) = Project::new(id, demo_core());
        state.insert_project(project.clone());
        let (_sub, mut events) = state.bus.subscribe().await;
        let handle = spawn(state.clone(), project.clone(), requests);

        project.enqueue(State::Deleting, String::new()).await;
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("worker should exit")
            .unwrap();

        assert!(!project_dir.exists());
        assert!(state.project(id).is_none());
        assert!(project_repository::load_all(&state.pool).await.unwrap().is_empty());
        assert!(task_repository::load_all(&state.pool).await.unwrap().is_empty());

        let created = events.recv().await.unwrap();
        assert!(created.contains("task/create"), "{created}");
        assert!(created.contains("DELETING"), "{created}");
        let project_state = events.recv().await.unwrap();
        assert!(project_state.contains("project/state"), "{project_state}");
        assert!(project_state.contains("DELETE_SUCCESS"), "{project_state}");
        let task_state = events.recv().await.unwrap();
        assert!(task_state.contains("task/state"), "{task_state}");
        assert!(task_state.contains("SUCCESS"), "{task_state}");
    }

    #[tokio::test]
    async fn test_pull_follow_up_re_prepares_on_changed_spec() {
        let fixture = fixture().await;
        let state = &fixture.state;
        let id = 1;
        let project_dir = state.projects_root.join(id.to_string());
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("BuildSpec"), "FROM alpine").unwrap();
        project_repository::create(&state.pool, "demo", "u", "main", "", "t")
            .await
            .unwrap();

        let (project, _requests) = Project::new(id, demo_core());
        state.insert_project(project.clone());

        // First pull: empty stored hash differs from the file hash.
        assert_eq!(pull_follow_up(state, &project).await, State::Preparing);
        let expected = Sha256::digest(b"FROM alpine").to_vec();
        assert_eq!(project.core.lock().unwrap().build_hash, expected);
        let (_, stored) = project_repository::load_all(&state.pool).await.unwrap().remove(0);
        assert_eq!(stored.build_hash, expected);

        // Unchanged spec: straight to BUILDING.
        assert_eq!(pull_follow_up(state, &project).await, State::Building);

        // Changed spec: PREPARING again, hash updated.
        std::fs::write(project_dir.join("BuildSpec"), "FROM debian").unwrap();
        assert_eq!(pull_follow_up(state, &project).await, State::Preparing);
        assert_eq!(
            project.core.lock().unwrap().build_hash,
            Sha256::digest(b"FROM debian").to_vec()
        );
    }

    #[tokio::test]
    async fn test_push_success_fans_out_rendered_tag() {
        let fixture = fixture().await;
        let state = &fixture.state;

        let (source, requests) = Project::new(1, {
            let mut core = demo_core();
            core.version = 4;
            core.state = State::Pushing;
            core.triggers.insert(2, State::Packaging);
            core
        });
        let (target, mut target_requests) = Project::new(2, demo_core());
        target.core.lock().unwrap().package_dep = Some(1);
        state.insert_project(source.clone());
        state.insert_project(target.clone());

        // A push with no destination degrades to the echo no-op, so the
        // stage succeeds without podman and the fan-out arm runs.
        project_repository::create(&state.pool, "src", "u", "main", "", "demo:$VERSION")
            .await
            .unwrap();
        let handle = spawn(state.clone(), source.clone(), requests);
        source.enqueue(State::Pushing, String::new()).await;

        let request = tokio::time::timeout(Duration::from_secs(10), target_requests.recv())
            .await
            .expect("target should receive a request")
            .unwrap();
        assert_eq!(request.stage, State::Packaging);
        assert_eq!(request.trigger, "demo:4");
        assert_eq!(source.core.lock().unwrap().state, State::PushSuccess);
        handle.abort();
    }
}
