//! Repository traits and in-memory implementations.

pub mod deploy;
pub mod job;
pub mod project;
pub mod stage;
pub mod user;
pub mod webhook;

pub use deploy::{DeployRepo, MemoryDeployRepo};
pub use job::{JobRepo, MemoryJobRepo};
pub use project::{MemoryProjectRepo, ProjectRepo};
pub use stage::{MemoryStageRepo, StageRepo};
pub use user::{MemoryUserRepo, UserRepo};
pub use webhook::{MemoryWebhookRepo, WebhookRepo};
