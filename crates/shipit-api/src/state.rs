//! Application state.

use shipit_config::SystemConfig;
use shipit_core::events::Hooks;
use shipit_core::scm::SourceControl;
use shipit_deployer::{BuddyGate, BuddyPolicy, CiIntegration, DeployService, WebhookDispatcher};
use shipit_engine::{EngineSettings, JobEngine};
use shipit_executor::LocalProcessExecutor;
use shipit_store::Stores;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state: repositories plus the wired-up deploy stack
/// (engine, deploy service, webhook dispatcher, CI integration).
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub engine: Arc<JobEngine>,
    pub service: Arc<DeployService>,
    pub integration: Arc<CiIntegration>,
    pub integration_secret: Option<String>,
}

impl AppState {
    pub fn new(stores: Stores, config: SystemConfig, scm: Arc<dyn SourceControl>) -> Self {
        let engine = JobEngine::start(
            Arc::clone(&stores.jobs),
            Arc::new(LocalProcessExecutor::new()),
            EngineSettings {
                workers: config.engine.workers,
                cancel_grace: Duration::from_secs(config.engine.cancel_grace_secs),
                output_buffer: config.engine.output_buffer,
            },
        );

        let gate = BuddyGate::new(
            BuddyPolicy::from_config(&config.buddy_check),
            Arc::clone(&stores.deploys),
            Arc::clone(&stores.jobs),
        );
        let hooks = Arc::new(Hooks::new());
        let service = DeployService::new(stores.clone(), Arc::clone(&engine), gate, hooks);
        service.start();

        let dispatcher = WebhookDispatcher::start(stores.clone(), config.webhooks.clone());
        dispatcher.attach(service.hooks());

        let integration = Arc::new(CiIntegration::new(
            stores.clone(),
            Arc::clone(&service),
            scm,
        ));

        Self {
            stores,
            engine,
            service,
            integration,
            integration_secret: config.integration.secret,
        }
    }
}
