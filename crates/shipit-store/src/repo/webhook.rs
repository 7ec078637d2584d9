//! Outbound webhook repository. Deletion is soft: hooks are deactivated and
//! kept for audit history, and every listing filters inactive hooks out.

use async_trait::async_trait;
use shipit_core::ResourceId;
use shipit_core::webhook::OutboundWebhook;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait WebhookRepo: Send + Sync {
    async fn create(&self, webhook: OutboundWebhook) -> StoreResult<OutboundWebhook>;
    async fn get(&self, id: ResourceId) -> StoreResult<OutboundWebhook>;
    /// Active hooks of a project.
    async fn list_by_project(&self, project_id: ResourceId) -> StoreResult<Vec<OutboundWebhook>>;
    /// Soft delete: mark inactive, excluded from dispatch immediately.
    async fn deactivate(&self, id: ResourceId) -> StoreResult<()>;
    async fn delete_by_project(&self, project_id: ResourceId) -> StoreResult<()>;
}

pub struct MemoryWebhookRepo {
    webhooks: RwLock<HashMap<ResourceId, OutboundWebhook>>,
}

impl MemoryWebhookRepo {
    pub fn new() -> Self {
        Self {
            webhooks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryWebhookRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookRepo for MemoryWebhookRepo {
    async fn create(&self, webhook: OutboundWebhook) -> StoreResult<OutboundWebhook> {
        self.webhooks
            .write()
            .expect("webhooks lock")
            .insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn get(&self, id: ResourceId) -> StoreResult<OutboundWebhook> {
        self.webhooks
            .read()
            .expect("webhooks lock")
            .get(&id)
            .filter(|w| w.active)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("webhook {id}")))
    }

    async fn list_by_project(&self, project_id: ResourceId) -> StoreResult<Vec<OutboundWebhook>> {
        let mut hooks: Vec<OutboundWebhook> = self
            .webhooks
            .read()
            .expect("webhooks lock")
            .values()
            .filter(|w| w.project_id == project_id && w.active)
            .cloned()
            .collect();
        hooks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(hooks)
    }

    async fn deactivate(&self, id: ResourceId) -> StoreResult<()> {
        let mut webhooks = self.webhooks.write().expect("webhooks lock");
        let hook = webhooks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("webhook {id}")))?;
        hook.active = false;
        Ok(())
    }

    async fn delete_by_project(&self, project_id: ResourceId) -> StoreResult<()> {
        self.webhooks
            .write()
            .expect("webhooks lock")
            .retain(|_, w| w.project_id != project_id);
        Ok(())
    }
}
