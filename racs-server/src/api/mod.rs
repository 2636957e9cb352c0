//! API Module
//!
//! HTTP control surface. Each submodule handles endpoints for a specific
//! domain; GET endpoints take query parameters, POST endpoints urlencoded
//! forms (uploads are multipart).

pub mod error;
pub mod events;
pub mod health;
pub mod project;
pub mod registry;
pub mod task;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::api::error::ApiError;
use crate::state::{AppState, SharedState};

/// Create the main API router with all endpoints
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Project endpoints
        .route("/project/create", post(project::create))
        .route("/project/update", post(project::update))
        .route("/project/triggers", post(project::triggers))
        .route("/project/build", post(project::build))
        .route("/project/delete", post(project::delete))
        .route("/project/upload", post(project::upload))
        .route("/project/list", get(project::list))
        .route("/project/status", get(project::status))
        .route("/project/events", get(events::stream))
        // Task endpoints
        .route("/task/logs", get(task::logs))
        // Registry endpoints
        .route("/registry/create", post(registry::create))
        // Add state and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(10_000_000))
        .layer(TraceLayer::new_for_http())
}

/// The binary role gate: with `--no-login` every request is admin;
/// otherwise mutating endpoints are refused.
pub fn require_admin(state: &AppState) -> Result<(), ApiError> {
    if state.no_login {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
