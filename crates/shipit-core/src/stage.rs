//! Stages: ordered deployment targets within a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub name: String,
    /// Shell command executed for each deploy to this stage. The git
    /// reference being deployed is exposed as `$DEPLOY_REFERENCE`.
    pub command: String,
    /// Hold deploys for a second approver (buddy check).
    pub requires_approval: bool,
    /// Allow more than one deploy to run on this stage at the same time.
    pub allow_concurrent: bool,
    /// Eligible for deploys triggered by inbound CI webhooks.
    pub auto_deploy: bool,
    /// Display/order position within the project.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Stage {
    pub fn new(project_id: ResourceId, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            project_id,
            name: name.into(),
            command: command.into(),
            requires_approval: false,
            allow_concurrent: false,
            auto_deploy: false,
            position: 0,
            created_at: Utc::now(),
        }
    }
}
