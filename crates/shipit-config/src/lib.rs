//! KDL configuration parsing for the Shipit server.
//!
//! Handles the `shipit.kdl` system configuration: server binding, engine
//! sizing, buddy-check policy and outbound webhook delivery bounds.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    BuddyCheckConfig, EngineConfig, IntegrationConfig, ServerConfig, SystemConfig, WebhookConfig,
    load_system_config, parse_system_config,
};
