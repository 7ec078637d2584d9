//! API routes.

pub mod deploys;
pub mod integrations;
pub mod projects;
pub mod webhooks;

use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};
use shipit_core::project::Project;

use crate::AppState;
use crate::error::ApiError;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/projects", projects::router())
        .merge(deploys::router())
        .merge(webhooks::router())
        .nest("/integrations", integrations::router())
        .route("/healthz", get(health))
        .with_state(state)
}

async fn health() -> axum::Json<Value> {
    axum::Json(json!({ "status": "ok" }))
}

/// Resolve a project path segment (permalink) to its record.
pub(crate) async fn find_project(state: &AppState, permalink: &str) -> Result<Project, ApiError> {
    state
        .stores
        .projects
        .find_by_permalink(permalink)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {permalink}")))
}
