//! Storage layer for Shipit.
//!
//! Repository traits with in-memory implementations. Persistence is an
//! external concern; everything behind these traits can be re-backed by a
//! database without touching the deploy core.

pub mod error;
pub mod repo;

pub use error::{StoreError, StoreResult};
pub use repo::*;

use std::sync::Arc;

/// Bundle of all repositories, shared across the engine, the deploy service
/// and the API.
#[derive(Clone)]
pub struct Stores {
    pub projects: Arc<dyn ProjectRepo>,
    pub stages: Arc<dyn StageRepo>,
    pub users: Arc<dyn UserRepo>,
    pub deploys: Arc<dyn DeployRepo>,
    pub jobs: Arc<dyn JobRepo>,
    pub webhooks: Arc<dyn WebhookRepo>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            projects: Arc::new(MemoryProjectRepo::new()),
            stages: Arc::new(MemoryStageRepo::new()),
            users: Arc::new(MemoryUserRepo::new()),
            deploys: Arc::new(MemoryDeployRepo::new()),
            jobs: Arc::new(MemoryJobRepo::new()),
            webhooks: Arc::new(MemoryWebhookRepo::new()),
        }
    }
}
