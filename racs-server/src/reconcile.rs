//! Startup reconciliation
//!
//! Rebuilds the in-memory world from the store: registries, projects with
//! their last persisted state, the five most recent tasks per project, and
//! the trigger graph with its dependency back-references. A project found
//! in a `_RUNNING` state stays there untouched; the child that was running
//! died with the previous process and only the user can decide to retry.

use racs_core::domain::state::State;
use racs_core::domain::task::{TaskRecord, TaskState};
use tracing::{info, warn};

use crate::repository::{
    project_repository, registry_repository, task_repository, trigger_repository,
};
use crate::service::worker;
use crate::state::{Project, SharedState};

pub async fn run(state: &SharedState) -> anyhow::Result<()> {
    for registry in registry_repository::load_all(&state.pool).await? {
        state
            .registries
            .lock()
            .unwrap()
            .insert(registry.name.clone(), registry);
    }

    let rows = project_repository::load_all(&state.pool).await?;
    let count = rows.len();
    for (id, core) in rows {
        let (project, requests) = Project::new(id, core);
        state.insert_project(project.clone());
        worker::spawn(state.clone(), project, requests);
    }

    // Tasks arrive in id order, so the per-project cap keeps the newest.
    for row in task_repository::load_all(&state.pool).await? {
        let Some(project) = state.project(row.project) else {
            continue;
        };
        let task_state = row.state.parse::<TaskState>().unwrap_or_else(|_| {
            warn!("Task {}: unknown state '{}', loading as ERROR", row.id, row.state);
            TaskState::Error
        });
        project.core.lock().unwrap().push_task(TaskRecord {
            id: row.id,
            kind: row.kind,
            state: task_state,
            time: row.time,
        });
    }

    for (source_id, target_id, stage_name) in trigger_repository::load_all(&state.pool).await? {
        let Ok(stage) = stage_name.parse::<State>() else {
            warn!("Trigger {}->{}: unknown stage '{}'", source_id, target_id, stage_name);
            continue;
        };
        let (Some(source), Some(target)) = (state.project(source_id), state.project(target_id))
        else {
            continue;
        };
        source.core.lock().unwrap().triggers.insert(target_id, stage);
        match stage {
            State::Preparing => target.core.lock().unwrap().prepare_dep = Some(source_id),
            State::Packaging => target.core.lock().unwrap().package_dep = Some(source_id),
            _ => {}
        }
    }

    info!("Loaded {} project(s) from the store", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::service::events::EventBus;
    use crate::state::AppState;
    use racs_core::domain::project::RECENT_TASKS;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, RwLock};
    use std::time::Duration;

    async fn app_state() -> (SharedState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState {
            pool: db::test_pool().await,
            bus: EventBus::start(),
            projects: RwLock::new(HashMap::new()),
            registries: Mutex::new(HashMap::new()),
            projects_root: dir.path().join("projects"),
            tasks_root: dir.path().join("tasks"),
            uploads_root: dir.path().join("uploads"),
            no_login: true,
        });
        (state, dir)
    }

    #[tokio::test]
    async fn test_rebuilds_projects_tasks_and_triggers() {
        let (state, _dir) = app_state().await;
        let pool = &state.pool;

        let a = project_repository::create(pool, "a", "https://example/a", "main", "", "a:$VERSION")
            .await
            .unwrap();
        let b = project_repository::create(pool, "b", "https://example/b", "main", "", "b:$VERSION")
            .await
            .unwrap();
        project_repository::update_state(pool, a, State::Building).await.unwrap();
        project_repository::update_version(pool, a, 9).await.unwrap();
        for n in 0..(RECENT_TASKS + 2) {
            let kind = if n % 2 == 0 { "BUILDING" } else { "PACKAGING" };
            let (id, _) = task_repository::create(pool, a, kind).await.unwrap();
            task_repository::update_state(pool, id, racs_core::domain::task::TaskState::Success)
                .await
                .unwrap();
        }
        trigger_repository::replace(pool, a, &[(b, State::Packaging)]).await.unwrap();
        registry_repository::upsert(pool, "reg1", "registry.example", "ci", "s").await.unwrap();

        run(&state).await.unwrap();

        assert!(state.registries.lock().unwrap().contains_key("reg1"));

        let project_a = state.project(a).unwrap();
        let project_b = state.project(b).unwrap();
        {
            let core = project_a.core.lock().unwrap();
            assert_eq!(core.state, State::Building);
            assert_eq!(core.version, 9);
            assert_eq!(core.tasks.len(), RECENT_TASKS);
            // Newest tasks survive the cap.
            assert_eq!(core.tasks.last().unwrap().id, (RECENT_TASKS + 2) as i64);
            assert_eq!(core.triggers.get(&b), Some(&State::Packaging));
        }
        assert_eq!(project_b.core.lock().unwrap().package_dep, Some(a));
    }

    #[tokio::test]
    async fn test_running_state_is_not_resumed() {
        let (state, _dir) = app_state().await;
        let pool = &state.pool;

        let id = project_repository::create(pool, "a", "u", "main", "", "t").await.unwrap();
        project_repository::update_state(pool, id, State::Building).await.unwrap();

        run(&state).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The worker is idle: no task was created and the state is as persisted.
        assert!(task_repository::load_all(pool).await.unwrap().is_empty());
        assert_eq!(
            state.project(id).unwrap().core.lock().unwrap().state,
            State::Building
        );
    }
}
