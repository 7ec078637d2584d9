//! Deploy lifecycle endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shipit_core::ResourceId;
use shipit_core::changeset::Changeset;
use shipit_core::deploy::Deploy;
use shipit_core::job::JobStatus;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::find_project;
use crate::ws::stream_deploy;

const DEPLOYS_PER_PAGE: usize = 25;
const ACTIVE_SCAN_LIMIT: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{project}/deploys",
            get(list_deploys).post(create_deploy),
        )
        .route(
            "/projects/{project}/deploys/{id}",
            get(get_deploy).delete(cancel_deploy),
        )
        .route(
            "/projects/{project}/deploys/{id}/approve",
            post(approve_deploy),
        )
        .route(
            "/projects/{project}/deploys/{id}/reject",
            post(reject_deploy),
        )
        .route(
            "/projects/{project}/deploys/{id}/stream",
            get(stream_deploy),
        )
        .route("/deploys/active", get(active_deploys))
}

#[derive(Debug, Serialize)]
pub(crate) struct DeployResponse {
    pub id: String,
    pub project_id: String,
    pub stage_id: String,
    pub reference: String,
    pub status: JobStatus,
    pub started_by: String,
    pub buddy_id: Option<String>,
    pub canceled_reason: Option<String>,
    pub exit_code: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub(crate) async fn deploy_response(
    state: &AppState,
    deploy: Deploy,
) -> Result<DeployResponse, ApiError> {
    let job = state.stores.jobs.get(deploy.job_id).await?;
    Ok(DeployResponse {
        id: deploy.id.to_string(),
        project_id: deploy.project_id.to_string(),
        stage_id: deploy.stage_id.to_string(),
        reference: deploy.reference,
        status: job.status,
        started_by: deploy.started_by.to_string(),
        buddy_id: deploy.buddy_id.map(|id| id.to_string()),
        canceled_reason: deploy.canceled_reason,
        exit_code: job.exit_code,
        created_at: deploy.created_at,
    })
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<usize>,
}

async fn list_deploys(
    State(state): State<AppState>,
    Path(permalink): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeployResponse>>, ApiError> {
    let project = find_project(&state, &permalink).await?;
    let page = query.page.unwrap_or(1).max(1);
    let deploys = state
        .stores
        .deploys
        .list_by_project(project.id, page, DEPLOYS_PER_PAGE)
        .await?;

    let mut response = Vec::with_capacity(deploys.len());
    for deploy in deploys {
        response.push(deploy_response(&state, deploy).await?);
    }
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct CreateDeployRequest {
    stage_id: Uuid,
    reference: String,
}

async fn create_deploy(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(permalink): Path<String>,
    Json(req): Json<CreateDeployRequest>,
) -> Result<(StatusCode, Json<DeployResponse>), ApiError> {
    let project = find_project(&state, &permalink).await?;
    let deploy = state
        .service
        .create_deploy(
            project.id,
            ResourceId::from_uuid(req.stage_id),
            &req.reference,
            &user,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(deploy_response(&state, deploy).await?)))
}

#[derive(Debug, Serialize)]
struct ChangesetResponse {
    repository: String,
    previous_commit: String,
    commit: String,
    compare_url: String,
}

#[derive(Debug, Serialize)]
struct DeployDetailResponse {
    #[serde(flatten)]
    deploy: DeployResponse,
    changeset: Option<ChangesetResponse>,
}

async fn get_deploy(
    State(state): State<AppState>,
    Path((permalink, id)): Path<(String, Uuid)>,
) -> Result<Json<DeployDetailResponse>, ApiError> {
    let project = find_project(&state, &permalink).await?;
    let deploy = state.stores.deploys.get(ResourceId::from_uuid(id)).await?;
    if deploy.project_id != project.id {
        return Err(ApiError::NotFound(format!("deploy {id} in {permalink}")));
    }

    // compare against the last reference that succeeded on this stage
    let mut changeset = None;
    for earlier in state.stores.deploys.list_by_stage(deploy.stage_id).await? {
        if earlier.id == deploy.id || earlier.created_at >= deploy.created_at {
            continue;
        }
        let job = state.stores.jobs.get(earlier.job_id).await?;
        if job.status == JobStatus::Succeeded {
            let cs = Changeset::new(
                project.repository_full_name(),
                earlier.reference,
                deploy.reference.clone(),
            );
            changeset = Some(ChangesetResponse {
                compare_url: cs.compare_url(),
                repository: cs.repository,
                previous_commit: cs.previous_commit,
                commit: cs.commit,
            });
            break;
        }
    }

    Ok(Json(DeployDetailResponse {
        deploy: deploy_response(&state, deploy).await?,
        changeset,
    }))
}

async fn cancel_deploy(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((permalink, id)): Path<(String, Uuid)>,
) -> Result<Json<DeployResponse>, ApiError> {
    let project = find_project(&state, &permalink).await?;
    let deploy_id = ResourceId::from_uuid(id);
    let deploy = state.stores.deploys.get(deploy_id).await?;
    if deploy.project_id != project.id {
        return Err(ApiError::NotFound(format!("deploy {id} in {permalink}")));
    }

    let deploy = state.service.cancel(deploy_id, &user, None).await?;
    Ok(Json(deploy_response(&state, deploy).await?))
}

async fn approve_deploy(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((_permalink, id)): Path<(String, Uuid)>,
) -> Result<Json<DeployResponse>, ApiError> {
    let deploy = state
        .service
        .approve(ResourceId::from_uuid(id), &user)
        .await?;
    Ok(Json(deploy_response(&state, deploy).await?))
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    reason: String,
}

async fn reject_deploy(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((_permalink, id)): Path<(String, Uuid)>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<DeployResponse>, ApiError> {
    let deploy = state
        .service
        .reject(ResourceId::from_uuid(id), &user, &req.reason)
        .await?;
    Ok(Json(deploy_response(&state, deploy).await?))
}

/// Non-terminal deploys across all projects.
async fn active_deploys(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeployResponse>>, ApiError> {
    let recent = state.stores.deploys.list_recent(ACTIVE_SCAN_LIMIT).await?;
    let mut response = Vec::new();
    for deploy in recent {
        let job = state.stores.jobs.get(deploy.job_id).await?;
        if job.status.is_active() {
            response.push(deploy_response(&state, deploy).await?);
        }
    }
    Ok(Json(response))
}
