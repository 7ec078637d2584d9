//! Outbound webhook management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shipit_core::ResourceId;
use shipit_core::webhook::{OutboundWebhook, WebhookEvent};
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::find_project;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{project}/webhooks",
            get(list_webhooks).post(create_webhook),
        )
        .route(
            "/projects/{project}/webhooks/{id}",
            axum::routing::delete(delete_webhook),
        )
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    id: String,
    stage_id: Option<String>,
    url: String,
    username: Option<String>,
    events: Vec<WebhookEvent>,
}

impl From<OutboundWebhook> for WebhookResponse {
    fn from(hook: OutboundWebhook) -> Self {
        Self {
            id: hook.id.to_string(),
            stage_id: hook.stage_id.map(|id| id.to_string()),
            url: hook.url,
            username: hook.username,
            events: hook.events,
        }
    }
}

async fn list_webhooks(
    State(state): State<AppState>,
    Path(permalink): Path<String>,
) -> Result<Json<Vec<WebhookResponse>>, ApiError> {
    let project = find_project(&state, &permalink).await?;
    let hooks = state.stores.webhooks.list_by_project(project.id).await?;
    Ok(Json(hooks.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateWebhookRequest {
    url: String,
    stage_id: Option<Uuid>,
    username: Option<String>,
    password: Option<String>,
    /// Transitions to fire on; terminal transitions only when omitted.
    events: Option<Vec<WebhookEvent>>,
}

async fn create_webhook(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(permalink): Path<String>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    if !user.can_deploy() {
        return Err(ApiError::Forbidden(
            "viewers may not manage webhooks".to_string(),
        ));
    }
    let project = find_project(&state, &permalink).await?;

    let mut hook = OutboundWebhook::new(
        project.id,
        req.stage_id.map(ResourceId::from_uuid),
        &req.url,
    )?;
    if let (Some(username), Some(password)) = (req.username, req.password) {
        hook = hook.with_basic_auth(username, password);
    }
    if let Some(events) = req.events {
        if events.is_empty() {
            return Err(ApiError::BadRequest(
                "webhook must subscribe to at least one event".to_string(),
            ));
        }
        hook = hook.with_events(events);
    }
    let hook = state.stores.webhooks.create(hook).await?;

    info!(project = %permalink, url = %hook.url, "Webhook registered");
    Ok((StatusCode::CREATED, Json(hook.into())))
}

/// Soft delete: the hook stops firing immediately but stays on record.
async fn delete_webhook(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((permalink, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    if !user.can_deploy() {
        return Err(ApiError::Forbidden(
            "viewers may not manage webhooks".to_string(),
        ));
    }
    let project = find_project(&state, &permalink).await?;
    let hook_id = ResourceId::from_uuid(id);
    let hook = state.stores.webhooks.get(hook_id).await?;
    if hook.project_id != project.id {
        return Err(ApiError::NotFound(format!("webhook {id} in {permalink}")));
    }

    state.stores.webhooks.deactivate(hook_id).await?;
    info!(project = %permalink, webhook = %id, "Webhook deactivated");
    Ok(StatusCode::NO_CONTENT)
}
