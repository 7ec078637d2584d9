//! Project and stage management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shipit_core::Error;
use shipit_core::project::Project;
use shipit_core::stage::Stage;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::find_project;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/{project}", get(get_project).delete(delete_project))
        .route("/{project}/stages", get(list_stages).post(create_stage))
}

#[derive(Debug, Serialize)]
struct ProjectResponse {
    id: String,
    name: String,
    permalink: String,
    repository_url: String,
    repository: String,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id.to_string(),
            repository: project.repository_full_name(),
            name: project.name,
            permalink: project.permalink,
            repository_url: project.repository_url,
        }
    }
}

async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state.stores.projects.list().await?;
    Ok(Json(projects.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    repository_owner: String,
    repository_name: String,
}

async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    if !user.can_deploy() {
        return Err(ApiError::Forbidden(
            "viewers may not create projects".to_string(),
        ));
    }
    let project = state
        .stores
        .projects
        .create(Project::new(
            &req.name,
            &req.repository_owner,
            &req.repository_name,
        ))
        .await?;
    info!(project = %project.permalink, user = %user.email, "Project created");
    Ok((StatusCode::CREATED, Json(project.into())))
}

async fn get_project(
    State(state): State<AppState>,
    Path(permalink): Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = find_project(&state, &permalink).await?;
    Ok(Json(project.into()))
}

/// Delete a project and everything it owns.
async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(permalink): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden(
            "only admins may delete projects".to_string(),
        ));
    }
    let project = find_project(&state, &permalink).await?;

    // stop anything still running before its records go away
    let deploys = state
        .stores
        .deploys
        .list_by_project(project.id, 1, usize::MAX)
        .await?;
    for deploy in &deploys {
        match state.engine.cancel(deploy.job_id).await {
            Ok(()) => {}
            Err(Error::Conflict(_)) => {} // already finished
            Err(e) => return Err(e.into()),
        }
        state.stores.jobs.delete(deploy.job_id).await?;
    }

    state.stores.stages.delete_by_project(project.id).await?;
    state.stores.deploys.delete_by_project(project.id).await?;
    state.stores.webhooks.delete_by_project(project.id).await?;
    state.stores.projects.delete(project.id).await?;
    info!(project = %permalink, user = %user.email, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct StageResponse {
    id: String,
    name: String,
    command: String,
    requires_approval: bool,
    allow_concurrent: bool,
    auto_deploy: bool,
    position: i32,
}

impl From<Stage> for StageResponse {
    fn from(stage: Stage) -> Self {
        Self {
            id: stage.id.to_string(),
            name: stage.name,
            command: stage.command,
            requires_approval: stage.requires_approval,
            allow_concurrent: stage.allow_concurrent,
            auto_deploy: stage.auto_deploy,
            position: stage.position,
        }
    }
}

async fn list_stages(
    State(state): State<AppState>,
    Path(permalink): Path<String>,
) -> Result<Json<Vec<StageResponse>>, ApiError> {
    let project = find_project(&state, &permalink).await?;
    let stages = state.stores.stages.list_by_project(project.id).await?;
    Ok(Json(stages.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateStageRequest {
    name: String,
    command: String,
    #[serde(default)]
    requires_approval: bool,
    #[serde(default)]
    allow_concurrent: bool,
    #[serde(default)]
    auto_deploy: bool,
    #[serde(default)]
    position: i32,
}

async fn create_stage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(permalink): Path<String>,
    Json(req): Json<CreateStageRequest>,
) -> Result<(StatusCode, Json<StageResponse>), ApiError> {
    if !user.can_deploy() {
        return Err(ApiError::Forbidden(
            "viewers may not create stages".to_string(),
        ));
    }
    let project = find_project(&state, &permalink).await?;

    let mut stage = Stage::new(project.id, &req.name, &req.command);
    stage.requires_approval = req.requires_approval;
    stage.allow_concurrent = req.allow_concurrent;
    stage.auto_deploy = req.auto_deploy;
    stage.position = req.position;
    let stage = state.stores.stages.create(stage).await?;

    info!(project = %permalink, stage = %stage.name, "Stage created");
    Ok((StatusCode::CREATED, Json(stage.into())))
}
