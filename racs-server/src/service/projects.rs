//! Project Service
//!
//! Business logic for the project catalogue: creation, metadata updates,
//! trigger replacement, and the JSON snapshots consumed by the list endpoint
//! and the SSE handshake. Everything that mutates a project's core takes its
//! lock, which serializes these handlers against the owning worker.

use std::path::{Component, Path};
use std::sync::Arc;

use racs_core::domain::project::ProjectCore;
use racs_core::domain::state::State;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::repository::{project_repository, trigger_repository};
use crate::service::worker;
use crate::state::{AppState, Project, SharedState};

/// Service error type
#[derive(Debug)]
pub enum ProjectError {
    Unknown(i64),
    BadInput(String),
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ProjectError {
    fn from(err: sqlx::Error) -> Self {
        ProjectError::Database(err)
    }
}

/// Create a project: store row, directory skeleton, in-memory handle,
/// worker, creation event, and the first cascade step (CLEANING).
pub async fn create(
    state: &SharedState,
    name: &str,
    url: &str,
    branch: &str,
    destination: &str,
    tag: &str,
) -> Result<Arc<Project>, ProjectError> {
    let id = project_repository::create(&state.pool, name, url, branch, destination, tag).await?;
    info!("Project created {} {} {} {}", id, name, url, branch);

    let dir = state.projects_root.join(id.to_string());
    for sub in ["context", "workspace"] {
        if let Err(err) = std::fs::create_dir_all(dir.join(sub)) {
            warn!("Project {}: cannot create {}/{}: {}", id, dir.display(), sub, err);
        }
    }

    let core = ProjectCore::created(
        name.into(),
        url.into(),
        branch.into(),
        destination.into(),
        tag.into(),
    );
    let (project, requests) = Project::new(id, core);
    state.insert_project(project.clone());
    worker::spawn(state.clone(), project.clone(), requests);

    let event = creation_event(id, &project.core.lock().unwrap());
    state.bus.publish(event).await;

    // A new project is in CREATE_SUCCESS; apply its cascade step.
    project.enqueue(State::Cleaning, String::new()).await;

    Ok(project)
}

fn creation_event(id: i64, core: &ProjectCore) -> Value {
    json!({
        "event": "project/create",
        "id": id,
        "name": core.name,
        "labels": core.labels,
        "url": core.url,
        "branch": core.branch,
        "destination": core.destination,
        "tag": core.tag,
        "buildSpec": core.build_spec,
        "packageSpec": core.package_spec,
        "state": core.state.name(),
        "version": core.version,
    })
}

/// Edited metadata for [`update`].
#[derive(Debug)]
pub struct ProjectUpdate {
    pub name: String,
    pub labels: String,
    pub url: String,
    pub branch: String,
    pub destination: String,
    pub tag: String,
    pub build_spec: String,
    pub package_spec: String,
}

/// Apply a metadata edit, persist it, and emit `project/update`.
pub async fn update(state: &AppState, id: i64, edit: ProjectUpdate) -> Result<(), ProjectError> {
    let project = state.project(id).ok_or(ProjectError::Unknown(id))?;

    let build_spec = sanitize(&edit.build_spec)
        .ok_or_else(|| ProjectError::BadInput(format!("bad buildSpec '{}'", edit.build_spec)))?;
    let package_spec = sanitize(&edit.package_spec)
        .ok_or_else(|| ProjectError::BadInput(format!("bad packageSpec '{}'", edit.package_spec)))?;

    let snapshot = {
        let mut core = project.core.lock().unwrap();
        core.name = edit.name;
        core.labels = edit.labels;
        core.url = edit.url;
        core.branch = edit.branch;
        core.destination = edit.destination;
        core.tag = edit.tag;
        core.build_spec = build_spec;
        core.package_spec = package_spec;
        core.clone()
    };

    // In-memory state stays authoritative over a failed write.
    if let Err(err) = project_repository::update_meta(&state.pool, id, &snapshot).await {
        warn!("Project {}: metadata update failed: {}", id, err);
    }

    state
        .bus
        .publish(json!({
            "event": "project/update",
            "id": id,
            "name": snapshot.name,
            "labels": snapshot.labels,
            "url": snapshot.url,
            "branch": snapshot.branch,
            "destination": snapshot.destination,
            "buildSpec": snapshot.build_spec,
            "packageSpec": snapshot.package_spec,
            "tag": snapshot.tag,
        }))
        .await;
    Ok(())
}

/// Replace every outgoing trigger of project `id`.
///
/// `spec` is the flat `target,stage,target,stage,...` list from the HTTP
/// surface. Old dependency back-references are cleared before the new edges
/// install theirs.
pub async fn set_triggers(state: &AppState, id: i64, spec: &str) -> Result<(), ProjectError> {
    let project = state.project(id).ok_or(ProjectError::Unknown(id))?;
    let edges = parse_triggers(spec)?;

    // Resolve all targets up front so a bad id leaves the graph untouched.
    let mut targets = Vec::with_capacity(edges.len());
    for (target_id, stage) in &edges {
        let target = state
            .project(*target_id)
            .ok_or(ProjectError::Unknown(*target_id))?;
        targets.push((target, *stage));
    }

    let old: Vec<(i64, State)> = {
        let mut core = project.core.lock().unwrap();
        core.triggers.drain().collect()
    };
    for (target_id, stage) in old {
        let Some(target) = state.project(target_id) else {
            continue;
        };
        let mut core = target.core.lock().unwrap();
        match stage {
            State::Preparing => core.prepare_dep = None,
            State::Packaging => core.package_dep = None,
            _ => {}
        }
    }

    {
        let mut core = project.core.lock().unwrap();
        core.triggers = edges.iter().copied().collect();
    }
    for (target, stage) in &targets {
        let mut core = target.core.lock().unwrap();
        match stage {
            State::Preparing => core.prepare_dep = Some(id),
            State::Packaging => core.package_dep = Some(id),
            _ => {}
        }
    }

    if let Err(err) = trigger_repository::replace(&state.pool, id, &edges).await {
        warn!("Project {}: trigger update failed: {}", id, err);
    }

    Ok(())
}

fn parse_triggers(spec: &str) -> Result<Vec<(i64, State)>, ProjectError> {
    let fields: Vec<&str> = spec.split(',').filter(|f| !f.is_empty()).collect();
    if fields.len() % 2 != 0 {
        return Err(ProjectError::BadInput(format!("odd trigger list '{spec}'")));
    }

    let mut edges = Vec::with_capacity(fields.len() / 2);
    for pair in fields.chunks(2) {
        let target: i64 = pair[0]
            .trim()
            .parse()
            .map_err(|_| ProjectError::BadInput(format!("bad trigger target '{}'", pair[0])))?;
        let stage = State::parse_stage(pair[1])
            .ok_or_else(|| ProjectError::BadInput(format!("bad trigger stage '{}'", pair[1])))?;
        edges.push((target, stage));
    }
    Ok(edges)
}

/// Snapshot of the whole catalogue, ordered by project id. Shared between
/// `GET /project/list` and the SSE handshake.
pub fn project_list(state: &AppState) -> Vec<Value> {
    let projects = state.projects.read().unwrap();
    let mut result: Vec<Value> = projects
        .iter()
        .map(|(id, project)| {
            let core = project.core.lock().unwrap();
            let tasks = serde_json::to_value(&core.tasks).unwrap_or_default();
            let triggers: Vec<Value> = core
                .triggers
                .iter()
                .map(|(target, stage)| json!([target, stage.name()]))
                .collect();
            json!({
                "id": id,
                "name": core.name,
                "labels": core.labels,
                "url": core.url,
                "branch": core.branch,
                "destination": core.destination,
                "tag": core.tag,
                "buildSpec": core.build_spec,
                "packageSpec": core.package_spec,
                "state": core.state.name(),
                "tasks": tasks,
                "version": core.version,
                "triggers": triggers,
            })
        })
        .collect();
    result.sort_by_key(|p| p["id"].as_i64().unwrap_or(0));
    result
}

/// Metadata snapshot of one project, for `GET /project/status`.
pub fn status(state: &AppState, id: i64) -> Option<Value> {
    let project = state.project(id)?;
    let core = project.core.lock().unwrap();
    Some(json!({
        "id": id,
        "name": core.name,
        "url": core.url,
        "branch": core.branch,
        "destination": core.destination,
        "buildSpec": core.build_spec,
        "packageSpec": core.package_spec,
        "tag": core.tag,
        "labels": core.labels,
    }))
}

/// Normalize a user-supplied relative path, rejecting anything that would
/// escape the project directory.
pub fn sanitize(name: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::service::events::EventBus;
    use std::collections::HashMap;
    use std::sync::{Mutex, RwLock};

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

    fn attach(state: &SharedState, id: i64) -> Arc<Project> {
        let core = ProjectCore::created(
            format!("p{id}"),
            "https://example/git".into(),
            "main".into(),
            "".into(),
            "t:$VERSION".into(),
        );
        // No worker; keep the queue receiver alive.
        let (project, requests) = Project::new(id, core);
        std::mem::forget(requests);
        state.insert_project(project.clone());
        project
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("BuildSpec").as_deref(), Some("BuildSpec"));
        assert_eq!(sanitize("./specs/Build").as_deref(), Some("specs/Build"));
        assert_eq!(sanitize("a/./b").as_deref(), Some("a/b"));
        assert_eq!(sanitize(""), None);
        assert_eq!(sanitize("."), None);
        assert_eq!(sanitize("../escape"), None);
        assert_eq!(sanitize("/etc/passwd"), None);
        assert_eq!(sanitize("a/../../b"), None);
    }

    #[test]
    fn test_parse_triggers() {
        assert_eq!(
            parse_triggers("2,package,3,clean").unwrap(),
            vec![(2, State::Packaging), (3, State::Cleaning)]
        );
        assert_eq!(parse_triggers("").unwrap(), vec![]);
        assert!(parse_triggers("2").is_err());
        assert!(parse_triggers("2,fly").is_err());
        assert!(parse_triggers("x,clean").is_err());
    }

    #[tokio::test]
    async fn test_set_triggers_installs_and_clears_back_references() {
        let (state, _dir) = app_state().await;
        let source = attach(&state, 1);
        let target = attach(&state, 2);
        let other = attach(&state, 3);

        set_triggers(&state, 1, "2,package,3,prepare").await.unwrap();
        assert_eq!(target.core.lock().unwrap().package_dep, Some(1));
        assert_eq!(other.core.lock().unwrap().prepare_dep, Some(1));
        assert_eq!(source.core.lock().unwrap().triggers.len(), 2);

        // Full replace drops the old edges and their back-references.
        set_triggers(&state, 1, "2,clean").await.unwrap();
        assert_eq!(target.core.lock().unwrap().package_dep, None);
        assert_eq!(other.core.lock().unwrap().prepare_dep, None);
        let core = source.core.lock().unwrap();
        assert_eq!(core.triggers.get(&2), Some(&State::Cleaning));
        assert_eq!(core.triggers.len(), 1);
        drop(core);

        let stored = trigger_repository::load_all(&state.pool).await.unwrap();
        assert_eq!(stored, vec![(1, 2, "CLEANING".to_string())]);
    }

    #[tokio::test]
    async fn test_set_triggers_unknown_target_leaves_graph_untouched() {
        let (state, _dir) = app_state().await;
        let source = attach(&state, 1);
        set_triggers(&state, 1, "2,clean").await.unwrap_err();
        assert!(source.core.lock().unwrap().triggers.is_empty());
    }

    #[tokio::test]
    async fn test_update_persists_and_sanitizes() {
        let (state, _dir) = app_state().await;
        let id = project_repository::create(&state.pool, "demo", "u", "main", "", "t")
            .await
            .unwrap();
        attach(&state, id);

        update(
            &state,
            id,
            ProjectUpdate {
                name: "renamed".into(),
                labels: "ci,nightly".into(),
                url: "https://example/other".into(),
                branch: "dev".into(),
                destination: "reg1".into(),
                tag: "v$VERSION".into(),
                build_spec: "./specs/Build".into(),
                package_spec: "Package".into(),
            },
        )
        .await
        .unwrap();

        let (_, core) = project_repository::load_all(&state.pool).await.unwrap().remove(0);
        assert_eq!(core.name, "renamed");
        assert_eq!(core.build_spec, "specs/Build");
        assert_eq!(core.labels, "ci,nightly");
    }

    #[tokio::test]
    async fn test_project_list_is_ordered() {
        let (state, _dir) = app_state().await;
        attach(&state, 3);
        attach(&state, 1);
        attach(&state, 2);

        let list = project_list(&state);
        let ids: Vec<i64> = list.iter().map(|p| p["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(list[0]["state"], "CREATE_SUCCESS");
    }

    #[tokio::test]
    async fn test_status_unknown_project() {
        let (state, _dir) = app_state().await;
        assert!(status(&state, 9).is_none());
    }
}
