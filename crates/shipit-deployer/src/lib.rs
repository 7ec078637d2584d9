//! Deploy lifecycle service.
//!
//! Sits between the HTTP layer and the job engine: creates deploy/job pairs,
//! runs the buddy-check gate, holds per-stage active-deploy locks, reacts to
//! engine transitions and fans terminal results out to outbound webhooks.

pub mod buddy;
pub mod dispatcher;
pub mod integration;
pub mod locks;
pub mod service;

pub use buddy::{BuddyGate, BuddyPolicy, BuddyVerdict};
pub use dispatcher::WebhookDispatcher;
pub use integration::{CiIntegration, CiOutcome, CiPayload, CiRepository};
pub use locks::StageLocks;
pub use service::DeployService;
