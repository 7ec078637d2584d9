//! System configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub buddy_check: BuddyCheckConfig,
    pub webhooks: WebhookConfig,
    pub integration: IntegrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API server binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of concurrent deploy workers.
    pub workers: usize,
    /// Seconds a cancelled job gets to exit before it is force-killed.
    pub cancel_grace_secs: u64,
    /// Per-observer live output buffer, in chunks.
    pub output_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cancel_grace_secs: 10,
            output_buffer: 1024,
        }
    }
}

/// Buddy-check bypass policy. Both rules are off unless configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuddyCheckConfig {
    /// Redeploys of a reference that succeeded on the same stage within this
    /// window need no second approval.
    pub grace_period_secs: Option<u64>,
    /// Roles allowed to deploy approval-gated stages unattended.
    pub exempt_roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Delivery attempts per outbound webhook before giving up.
    pub max_attempts: u32,
    /// Initial back-off between attempts, doubled each retry.
    pub backoff_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 1,
        }
    }
}

/// Inbound CI integration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Shared secret for HMAC signatures on inbound CI payloads. Unsigned
    /// payloads are accepted when unset.
    pub secret: Option<String>,
}

/// Load system configuration from a file.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

/// Parse system configuration from KDL text. Missing nodes fall back to
/// defaults, so an empty document is a valid configuration.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => {
                if let Some(bind) = get_string_prop(node, "bind") {
                    config.server.bind = bind;
                }
            }
            "engine" => {
                if let Some(workers) = get_int_prop(node, "workers")? {
                    if workers == 0 {
                        return Err(ConfigError::InvalidValue {
                            field: "engine workers".to_string(),
                            message: "must be at least 1".to_string(),
                        });
                    }
                    config.engine.workers = workers as usize;
                }
                if let Some(grace) = get_int_prop(node, "cancel-grace-secs")? {
                    config.engine.cancel_grace_secs = grace;
                }
                if let Some(buffer) = get_int_prop(node, "output-buffer")? {
                    config.engine.output_buffer = buffer as usize;
                }
            }
            "buddy-check" => {
                config.buddy_check.grace_period_secs = get_int_prop(node, "grace-period-secs")?;
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "exempt-role" {
                            if let Some(role) = get_first_string_arg(child) {
                                config.buddy_check.exempt_roles.push(role);
                            }
                        }
                    }
                }
            }
            "outbound-webhooks" => {
                if let Some(attempts) = get_int_prop(node, "max-attempts")? {
                    config.webhooks.max_attempts = attempts as u32;
                }
                if let Some(backoff) = get_int_prop(node, "backoff-secs")? {
                    config.webhooks.backoff_secs = backoff;
                }
            }
            "integration" => {
                config.integration.secret = get_string_prop(node, "secret");
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_int_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<u64>> {
    match node.get(name) {
        None => Ok(None),
        Some(value) => {
            let n = value.as_integer().ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{} {}", node.name().value(), name),
                message: "expected an integer".to_string(),
            })?;
            u64::try_from(n).map(Some).map_err(|_| ConfigError::InvalidValue {
                field: format!("{} {}", node.name().value(), name),
                message: "must not be negative".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.engine.workers, 4);
        assert_eq!(config.webhooks.max_attempts, 3);
        assert!(config.buddy_check.grace_period_secs.is_none());
    }

    #[test]
    fn parses_full_config() {
        let kdl = r#"
            server bind="127.0.0.1:8080"

            engine workers=2 cancel-grace-secs=5 output-buffer=256

            buddy-check grace-period-secs=3600 {
                exempt-role "admin"
            }

            outbound-webhooks max-attempts=5 backoff-secs=2

            integration secret="hunter2"
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.engine.cancel_grace_secs, 5);
        assert_eq!(config.buddy_check.grace_period_secs, Some(3600));
        assert_eq!(config.buddy_check.exempt_roles, vec!["admin"]);
        assert_eq!(config.webhooks.max_attempts, 5);
        assert_eq!(config.integration.secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn rejects_zero_workers() {
        let result = parse_system_config("engine workers=0");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn rejects_non_integer_counts() {
        let result = parse_system_config(r#"engine workers="many""#);
        assert!(result.is_err());
    }

    #[test]
    fn loads_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipit.kdl");
        std::fs::write(&path, r#"server bind="127.0.0.1:9999""#).unwrap();

        let config = load_system_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9999");

        let missing = load_system_config(dir.path().join("nope.kdl"));
        assert!(matches!(missing.unwrap_err(), ConfigError::Io(_)));
    }
}
