//! Task API Handlers

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::api::error::ApiResult;
use crate::repository::task_repository;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct LogsQuery {
    pub id: i64,
    #[serde(default)]
    pub offset: u64,
}

/// GET /task/logs
/// Stream the captured log of one task from `offset`. The task's lifecycle
/// state rides along in `X-Task-State` so the UI knows whether to keep
/// polling. A missing log or an offset past EOF yields an empty body.
pub async fn logs(
    State(state): State<SharedState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let task_state = task_repository::state(&state.pool, query.id)
        .await?
        .unwrap_or_default();

    let path = state.tasks_root.join(query.id.to_string()).join("out.log");
    let mut body = Vec::new();
    if let Ok(mut file) = tokio::fs::File::open(&path).await {
        let _ = file.seek(std::io::SeekFrom::Start(query.offset)).await;
        let _ = file.read_to_end(&mut body).await;
    }

    Ok((
        [
            ("content-type", "text/plain".to_string()),
            ("x-task-state", task_state),
        ],
        body,
    ))
}
