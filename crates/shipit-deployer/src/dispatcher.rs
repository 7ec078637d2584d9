//! Outbound webhook delivery.
//!
//! Deploy transitions are forwarded onto a channel by a cheap hook handler; a
//! background task loads the hooks of the project and POSTs a JSON summary to
//! every hook subscribed to the transition (terminal ones by default).
//! Delivery is best-effort: bounded retries with doubling back-off, failures
//! are logged and never surface into the deploy itself.

use serde_json::json;
use shipit_config::WebhookConfig;
use shipit_core::events::{DeployEvent, Hooks};
use shipit_core::job::JobStatus;
use shipit_core::webhook::{OutboundWebhook, WebhookEvent};
use shipit_core::{ResourceId, Result};
use shipit_store::Stores;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Delivery {
    deploy_id: ResourceId,
    event: WebhookEvent,
    status: Option<JobStatus>,
}

pub struct WebhookDispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl WebhookDispatcher {
    /// Spawn the delivery task and return the dispatcher handle.
    pub fn start(stores: Stores, config: WebhookConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver_loop(stores, config, rx));
        Arc::new(Self { tx })
    }

    /// Register this dispatcher on the lifecycle hook registry. Only
    /// forwards the event; all I/O happens on the delivery task.
    pub fn attach(self: &Arc<Self>, hooks: &Hooks) {
        let dispatcher = Arc::clone(self);
        hooks.register(move |event| {
            let delivery = match event {
                DeployEvent::Queued { deploy_id } => Delivery {
                    deploy_id: *deploy_id,
                    event: WebhookEvent::Queued,
                    status: None,
                },
                DeployEvent::Started { deploy_id } => Delivery {
                    deploy_id: *deploy_id,
                    event: WebhookEvent::Started,
                    status: None,
                },
                DeployEvent::Finished { deploy_id, status } => Delivery {
                    deploy_id: *deploy_id,
                    event: WebhookEvent::Finished,
                    status: Some(*status),
                },
                _ => return,
            };
            let _ = dispatcher.tx.send(delivery);
        });
    }
}

async fn deliver_loop(
    stores: Stores,
    config: WebhookConfig,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
) {
    let client = reqwest::Client::new();
    while let Some(delivery) = rx.recv().await {
        if let Err(e) = fan_out(&stores, &config, &client, delivery).await {
            warn!(
                deploy_id = %delivery.deploy_id,
                error = %e,
                "Webhook fan-out failed"
            );
        }
    }
}

/// Deliver one transition to every matching, subscribed active hook.
async fn fan_out(
    stores: &Stores,
    config: &WebhookConfig,
    client: &reqwest::Client,
    delivery: Delivery,
) -> Result<()> {
    let deploy = stores.deploys.get(delivery.deploy_id).await?;
    let hooks = stores.webhooks.list_by_project(deploy.project_id).await?;
    let hooks: Vec<OutboundWebhook> = hooks
        .into_iter()
        .filter(|h| h.applies_to(deploy.stage_id) && h.subscribed_to(delivery.event))
        .collect();
    if hooks.is_empty() {
        return Ok(());
    }

    let project = stores.projects.get(deploy.project_id).await?;
    let stage = stores.stages.get(deploy.stage_id).await?;
    let starter = stores.users.get(deploy.started_by).await?;
    let job = stores.jobs.get(deploy.job_id).await?;

    let payload = json!({
        "deploy_id": deploy.id,
        "event": delivery.event,
        "project": project.name,
        "stage": stage.name,
        "reference": deploy.reference,
        "status": delivery.status.unwrap_or(job.status),
        "started_by": starter.email,
        "exit_code": job.exit_code,
        "finished_at": job.finished_at,
    });

    for hook in hooks {
        deliver_with_retry(client, config, &hook, &payload).await;
    }
    Ok(())
}

async fn deliver_with_retry(
    client: &reqwest::Client,
    config: &WebhookConfig,
    hook: &OutboundWebhook,
    payload: &serde_json::Value,
) {
    let mut backoff = Duration::from_secs(config.backoff_secs);
    for attempt in 1..=config.max_attempts {
        let mut request = client.post(&hook.url).json(payload);
        if let Some(username) = &hook.username {
            request = request.basic_auth(username, hook.password.as_deref());
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %hook.url, attempt, "Webhook delivered");
                return;
            }
            Ok(response) => {
                warn!(url = %hook.url, attempt, status = %response.status(), "Webhook rejected");
            }
            Err(e) => {
                warn!(url = %hook.url, attempt, error = %e, "Webhook delivery failed");
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
    warn!(url = %hook.url, attempts = config.max_attempts, "Giving up on webhook delivery");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use shipit_core::deploy::Deploy;
    use shipit_core::job::Job;
    use shipit_core::project::Project;
    use shipit_core::stage::Stage;
    use shipit_core::user::{Role, User};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{Instant, sleep};

    #[derive(Clone, Default)]
    struct Received {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        // number of requests to reject before accepting
        reject_first: Arc<AtomicU32>,
    }

    async fn hook_endpoint(
        State(received): State<Received>,
        body: axum::Json<serde_json::Value>,
    ) -> StatusCode {
        if received.reject_first.load(Ordering::SeqCst) > 0 {
            received.reject_first.fetch_sub(1, Ordering::SeqCst);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        received.bodies.lock().unwrap().push(body.0);
        StatusCode::OK
    }

    async fn spawn_receiver() -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/hook", post(hook_endpoint))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), received)
    }

    /// Seeds a finished deploy and returns its id.
    async fn seed_finished_deploy(stores: &Stores) -> (ResourceId, ResourceId) {
        let project = stores
            .projects
            .create(Project::new("Widget", "acme", "widget"))
            .await
            .unwrap();
        let stage = stores
            .stages
            .create(Stage::new(project.id, "production", "true"))
            .await
            .unwrap();
        let user = stores
            .users
            .create(User::new("Dana", "dana@example.com", Role::Deployer))
            .await
            .unwrap();
        let job = stores.jobs.create(Job::new("true")).await.unwrap();
        stores.jobs.transition(job.id, JobStatus::Queued).await.unwrap();
        stores.jobs.transition(job.id, JobStatus::Running).await.unwrap();
        stores
            .jobs
            .transition(job.id, JobStatus::Succeeded)
            .await
            .unwrap();
        let deploy = stores
            .deploys
            .create(Deploy::new(project.id, stage.id, "v1.0", job.id, user.id))
            .await
            .unwrap();
        (deploy.id, stage.id)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for webhook");
            sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn delivers_terminal_transitions() {
        let stores = Stores::in_memory();
        let (url, received) = spawn_receiver().await;
        let (deploy_id, stage_id) = seed_finished_deploy(&stores).await;
        let deploy = stores.deploys.get(deploy_id).await.unwrap();
        stores
            .webhooks
            .create(OutboundWebhook::new(deploy.project_id, None, &url).unwrap())
            .await
            .unwrap();

        let hooks = Hooks::new();
        let dispatcher = WebhookDispatcher::start(stores.clone(), WebhookConfig::default());
        dispatcher.attach(&hooks);

        hooks.fire(&DeployEvent::Finished {
            deploy_id,
            status: JobStatus::Succeeded,
        });

        wait_for(|| !received.bodies.lock().unwrap().is_empty()).await;
        let bodies = received.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["status"], "succeeded");
        assert_eq!(bodies[0]["stage"], "production");
        assert_eq!(bodies[0]["reference"], "v1.0");
        drop(bodies);

        // non-terminal events are ignored
        hooks.fire(&DeployEvent::Started { deploy_id });
        sleep(Duration::from_millis(100)).await;
        assert_eq!(received.bodies.lock().unwrap().len(), 1);
        let _ = stage_id;
    }

    #[tokio::test]
    async fn hooks_can_subscribe_to_non_terminal_transitions() {
        let stores = Stores::in_memory();
        let (url, received) = spawn_receiver().await;
        let (deploy_id, _) = seed_finished_deploy(&stores).await;
        let deploy = stores.deploys.get(deploy_id).await.unwrap();
        stores
            .webhooks
            .create(
                OutboundWebhook::new(deploy.project_id, None, &url)
                    .unwrap()
                    .with_events(vec![WebhookEvent::Started]),
            )
            .await
            .unwrap();

        let hooks = Hooks::new();
        let dispatcher = WebhookDispatcher::start(stores.clone(), WebhookConfig::default());
        dispatcher.attach(&hooks);

        hooks.fire(&DeployEvent::Started { deploy_id });
        wait_for(|| !received.bodies.lock().unwrap().is_empty()).await;
        assert_eq!(received.bodies.lock().unwrap()[0]["event"], "started");

        // not subscribed to terminal transitions
        hooks.fire(&DeployEvent::Finished {
            deploy_id,
            status: JobStatus::Succeeded,
        });
        sleep(Duration::from_millis(100)).await;
        assert_eq!(received.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retries_until_the_endpoint_accepts() {
        let stores = Stores::in_memory();
        let (url, received) = spawn_receiver().await;
        received.reject_first.store(2, Ordering::SeqCst);
        let (deploy_id, _) = seed_finished_deploy(&stores).await;
        let deploy = stores.deploys.get(deploy_id).await.unwrap();
        stores
            .webhooks
            .create(OutboundWebhook::new(deploy.project_id, None, &url).unwrap())
            .await
            .unwrap();

        let hooks = Hooks::new();
        let config = WebhookConfig {
            max_attempts: 3,
            backoff_secs: 0,
        };
        let dispatcher = WebhookDispatcher::start(stores.clone(), config);
        dispatcher.attach(&hooks);

        hooks.fire(&DeployEvent::Finished {
            deploy_id,
            status: JobStatus::Failed,
        });

        wait_for(|| !received.bodies.lock().unwrap().is_empty()).await;
        assert_eq!(received.bodies.lock().unwrap()[0]["status"], "failed");
    }

    #[tokio::test]
    async fn stage_scoped_hooks_skip_other_stages() {
        let stores = Stores::in_memory();
        let (url, received) = spawn_receiver().await;
        let (deploy_id, _) = seed_finished_deploy(&stores).await;
        let deploy = stores.deploys.get(deploy_id).await.unwrap();

        // scoped to a different stage
        stores
            .webhooks
            .create(
                OutboundWebhook::new(deploy.project_id, Some(ResourceId::new()), &url).unwrap(),
            )
            .await
            .unwrap();

        let hooks = Hooks::new();
        let dispatcher = WebhookDispatcher::start(stores.clone(), WebhookConfig::default());
        dispatcher.attach(&hooks);

        hooks.fire(&DeployEvent::Finished {
            deploy_id,
            status: JobStatus::Succeeded,
        });
        sleep(Duration::from_millis(200)).await;
        assert!(received.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_hooks_are_not_delivered() {
        let stores = Stores::in_memory();
        let (url, received) = spawn_receiver().await;
        let (deploy_id, _) = seed_finished_deploy(&stores).await;
        let deploy = stores.deploys.get(deploy_id).await.unwrap();
        let hook = stores
            .webhooks
            .create(OutboundWebhook::new(deploy.project_id, None, &url).unwrap())
            .await
            .unwrap();
        stores.webhooks.deactivate(hook.id).await.unwrap();

        let hooks = Hooks::new();
        let dispatcher = WebhookDispatcher::start(stores.clone(), WebhookConfig::default());
        dispatcher.attach(&hooks);

        hooks.fire(&DeployEvent::Finished {
            deploy_id,
            status: JobStatus::Succeeded,
        });
        sleep(Duration::from_millis(200)).await;
        assert!(received.bodies.lock().unwrap().is_empty());
    }
}
