//! Registry API Handlers

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::require_admin;
use crate::service::registry_service;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct CreateForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// POST /registry/create
/// Create or replace a push destination.
pub async fn create(
    State(state): State<SharedState>,
    Form(form): Form<CreateForm>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&state)?;

    registry_service::create(&state, &form.name, &form.url, &form.user, &form.password).await?;
    Ok((StatusCode::CREATED, form.name))
}
