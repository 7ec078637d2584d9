//! WebSocket streaming of deploy output.
//!
//! Replays the stored output log first, then follows the live broadcast
//! until the job finishes. Observers that fall behind lose chunks; the
//! stream tells them how many.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use shipit_core::ResourceId;
use shipit_core::executor::OutputStream;
use shipit_core::job::JobStatus;
use shipit_engine::LiveChunk;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::find_project;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage {
    /// Output accumulated before this observer connected.
    Replay { content: String },
    Log {
        stream: OutputStream,
        content: String,
    },
    /// Chunks this observer missed by reading too slowly.
    Lagged { missed: u64 },
    Finished { status: JobStatus },
}

/// `GET /projects/{project}/deploys/{id}/stream`
pub async fn stream_deploy(
    State(state): State<AppState>,
    Path((permalink, id)): Path<(String, Uuid)>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let project = find_project(&state, &permalink).await?;
    let deploy = state.stores.deploys.get(ResourceId::from_uuid(id)).await?;
    if deploy.project_id != project.id {
        return Err(ApiError::NotFound(format!("deploy {id} in {permalink}")));
    }

    Ok(ws.on_upgrade(move |socket| stream_job(socket, state, deploy.job_id)))
}

async fn stream_job(mut socket: WebSocket, state: AppState, job_id: ResourceId) {
    // subscribe before reading the log so no chunk falls in the gap
    let live = state.engine.follow(job_id);

    let job = match state.stores.jobs.get(job_id).await {
        Ok(job) => job,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Job lookup failed for stream");
            return;
        }
    };

    let replayed = job.output.len();
    if !job.output.is_empty()
        && send(&mut socket, &StreamMessage::Replay { content: job.output })
            .await
            .is_err()
    {
        return;
    }

    if let Some(receiver) = live {
        if follow(&mut socket, receiver, replayed).await.is_err() {
            return;
        }
    }

    // the runtime is gone, the final status is on record
    if let Ok(job) = state.stores.jobs.get(job_id).await {
        let _ = send(&mut socket, &StreamMessage::Finished { status: job.status }).await;
    }
    let _ = socket.send(Message::Close(None)).await;
    debug!(job_id = %job_id, "Output stream closed");
}

async fn follow(
    socket: &mut WebSocket,
    mut receiver: broadcast::Receiver<LiveChunk>,
    replayed: usize,
) -> Result<(), axum::Error> {
    loop {
        match receiver.recv().await {
            Ok(live) => {
                // already covered by the replayed log
                if live.offset < replayed {
                    continue;
                }
                send(
                    socket,
                    &StreamMessage::Log {
                        stream: live.chunk.stream,
                        content: live.chunk.content,
                    },
                )
                .await?;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                send(socket, &StreamMessage::Lagged { missed }).await?;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn send(socket: &mut WebSocket, message: &StreamMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).expect("stream message serializes");
    socket.send(Message::Text(json.into())).await
}
