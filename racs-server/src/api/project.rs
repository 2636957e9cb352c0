//! Project API Handlers

use axum::{
    Json,
    extract::{Form, Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use racs_core::domain::state::State as PipelineState;
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::require_admin;
use crate::service::projects_service;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct CreateForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub tag: String,
}

/// POST /project/create
/// Create a project and seed its pipeline.
pub async fn create(
    State(state): State<SharedState>,
    Form(form): Form<CreateForm>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&state)?;
    tracing::info!("Creating project: {}", form.name);

    let project = projects_service::create(
        &state,
        &form.name,
        &form.url,
        &form.branch,
        &form.destination,
        &form.tag,
    )
    .await?;

    Ok((StatusCode::CREATED, project.id.to_string()))
}

#[derive(Deserialize)]
pub struct UpdateForm {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default, rename = "buildSpec")]
    pub build_spec: String,
    #[serde(default, rename = "packageSpec")]
    pub package_spec: String,
}

/// POST /project/update
/// Edit project metadata.
pub async fn update(
    State(state): State<SharedState>,
    Form(form): Form<UpdateForm>,
) -> ApiResult<&'static str> {
    require_admin(&state)?;

    projects_service::update(
        &state,
        form.id,
        projects_service::ProjectUpdate {
            name: form.name,
            labels: form.labels,
            url: form.url,
            branch: form.branch,
            destination: form.destination,
            tag: form.tag,
            build_spec: form.build_spec,
            package_spec: form.package_spec,
        },
    )
    .await?;

    Ok("OK")
}

#[derive(Deserialize)]
pub struct TriggersForm {
    pub id: i64,
    #[serde(default)]
    pub triggers: String,
}

/// POST /project/triggers
/// Replace a project's outgoing triggers.
pub async fn triggers(
    State(state): State<SharedState>,
    Form(form): Form<TriggersForm>,
) -> ApiResult<&'static str> {
    require_admin(&state)?;
    projects_service::set_triggers(&state, form.id, &form.triggers).await?;
    Ok("OK")
}

#[derive(Deserialize)]
pub struct BuildForm {
    pub id: i64,
    #[serde(default)]
    pub stage: String,
}

/// POST /project/build
/// Enqueue one pipeline stage. Parameters are taken from the query string
/// or an urlencoded body, whichever carries them.
pub async fn build(
    State(state): State<SharedState>,
    query: Result<Query<BuildForm>, axum::extract::rejection::QueryRejection>,
    form: Result<Form<BuildForm>, axum::extract::rejection::FormRejection>,
) -> ApiResult<&'static str> {
    let params = query
        .ok()
        .map(|Query(q)| q)
        .or(form.ok().map(|Form(f)| f))
        .ok_or_else(|| ApiError::BadRequest("missing id and stage".into()))?;

    let stage = PipelineState::parse_stage(&params.stage)
        .ok_or_else(|| ApiError::BadRequest(format!("bad stage '{}'", params.stage)))?;
    let project = state
        .project(params.id)
        .ok_or_else(|| ApiError::InternalError(format!("no such project {}", params.id)))?;

    project.enqueue(stage, String::new()).await;
    Ok("OK")
}

#[derive(Deserialize)]
pub struct DeleteForm {
    pub id: i64,
    #[serde(default)]
    pub confirm: String,
}

/// POST /project/delete
/// Enqueue project deletion; ignored without `confirm=YES`.
pub async fn delete(
    State(state): State<SharedState>,
    Form(form): Form<DeleteForm>,
) -> ApiResult<&'static str> {
    require_admin(&state)?;

    if form.confirm == "YES" {
        let project = state
            .project(form.id)
            .ok_or_else(|| ApiError::InternalError(format!("no such project {}", form.id)))?;
        tracing::info!("Deleting project {}", form.id);
        project.enqueue(PipelineState::Deleting, String::new()).await;
    }
    Ok("OK")
}

/// GET /project/list
/// Snapshot of every project, ordered by id.
pub async fn list(State(state): State<SharedState>) -> Json<Vec<serde_json::Value>> {
    Json(projects_service::project_list(&state))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub id: i64,
}

/// GET /project/status
/// Metadata snapshot of one project.
pub async fn status(
    State(state): State<SharedState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    projects_service::status(&state, query.id)
        .map(Json)
        .ok_or_else(|| ApiError::InternalError(format!("no such project {}", query.id)))
}

/// POST /project/upload
/// Stage a file into `uploads/` and move it into the project directory.
///
/// Multipart fields: `id`, `name`, and either a `file` part or a literal
/// `value` field carrying the content.
pub async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<&'static str> {
    require_admin(&state)?;

    let mut id: Option<i64> = None;
    let mut name: Option<String> = None;
    let mut staged: Option<std::path::PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("bad multipart body: {err}")))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("bad id field: {err}")))?;
                id = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ApiError::BadRequest(format!("bad id '{text}'")))?,
                );
            }
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| ApiError::BadRequest(format!("bad name field: {err}")))?,
                );
            }
            Some("file") | Some("value") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("bad content field: {err}")))?;
                staged = Some(stage_upload(&state, &bytes).await?);
            }
            _ => {}
        }
    }

    let id = id.ok_or_else(|| ApiError::BadRequest("missing id".into()))?;
    let name = name.ok_or_else(|| ApiError::BadRequest("missing name".into()))?;
    let staged = staged.ok_or_else(|| ApiError::BadRequest("missing file or value".into()))?;

    let name = projects_service::sanitize(&name)
        .ok_or_else(|| ApiError::InternalError(format!("bad upload name '{name}'")))?;
    let project = state
        .project(id)
        .ok_or_else(|| ApiError::InternalError(format!("no such project {id}")))?;

    let destination = state.projects_root.join(project.id.to_string()).join(&name);
    tokio::fs::rename(&staged, &destination)
        .await
        .map_err(|err| ApiError::InternalError(format!("cannot install upload: {err}")))?;
    tracing::info!("Project {} received upload {}", id, name);

    Ok("OK")
}

/// Write content into a fresh `uploads/upload-<digits>` staging file.
async fn stage_upload(state: &crate::state::AppState, bytes: &[u8]) -> ApiResult<std::path::PathBuf> {
    let serial = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let path = state.uploads_root.join(format!("upload-{serial}"));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| ApiError::InternalError(format!("cannot stage upload: {err}")))?;
    Ok(path)
}
