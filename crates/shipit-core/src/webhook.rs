//! Outbound webhooks: configured HTTP callbacks fired on deploy events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, ResourceId, Result};

/// Lifecycle transitions a hook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    Queued,
    Started,
    Finished,
}

fn default_events() -> Vec<WebhookEvent> {
    vec![WebhookEvent::Finished]
}

/// An outbound webhook target. Soft-deletable: deactivated hooks are kept for
/// audit history but excluded from every query and from dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundWebhook {
    pub id: ResourceId,
    pub project_id: ResourceId,
    /// When set, only deploys to this stage trigger the hook; otherwise the
    /// hook is project-wide.
    pub stage_id: Option<ResourceId>,
    pub url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Transitions this hook fires on. Terminal transitions only by default.
    #[serde(default = "default_events")]
    pub events: Vec<WebhookEvent>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl OutboundWebhook {
    pub fn new(
        project_id: ResourceId,
        stage_id: Option<ResourceId>,
        url: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into();
        let parsed =
            Url::parse(&url).map_err(|e| Error::InvalidInput(format!("webhook url: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidInput(format!(
                "webhook url must be http(s), got {}",
                parsed.scheme()
            )));
        }
        Ok(Self {
            id: ResourceId::new(),
            project_id,
            stage_id,
            url,
            username: None,
            password: None,
            events: default_events(),
            active: true,
            created_at: Utc::now(),
        })
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_events(mut self, events: Vec<WebhookEvent>) -> Self {
        self.events = events;
        self
    }

    /// Whether this hook should fire for a deploy to `stage_id`.
    pub fn applies_to(&self, stage_id: ResourceId) -> bool {
        self.active && self.stage_id.is_none_or(|s| s == stage_id)
    }

    pub fn subscribed_to(&self, event: WebhookEvent) -> bool {
        self.events.contains(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_urls() {
        let project = ResourceId::new();
        assert!(OutboundWebhook::new(project, None, "not a url").is_err());
        assert!(OutboundWebhook::new(project, None, "ftp://example.com").is_err());
        assert!(OutboundWebhook::new(project, None, "https://example.com/hook").is_ok());
    }

    #[test]
    fn stage_scoping() {
        let project = ResourceId::new();
        let stage_a = ResourceId::new();
        let stage_b = ResourceId::new();

        let wide = OutboundWebhook::new(project, None, "https://example.com").unwrap();
        assert!(wide.applies_to(stage_a));
        assert!(wide.applies_to(stage_b));

        let scoped = OutboundWebhook::new(project, Some(stage_a), "https://example.com").unwrap();
        assert!(scoped.applies_to(stage_a));
        assert!(!scoped.applies_to(stage_b));
    }

    #[test]
    fn finished_is_the_default_subscription() {
        let hook = OutboundWebhook::new(ResourceId::new(), None, "https://example.com").unwrap();
        assert!(hook.subscribed_to(WebhookEvent::Finished));
        assert!(!hook.subscribed_to(WebhookEvent::Started));

        let hook = hook.with_events(vec![WebhookEvent::Queued, WebhookEvent::Started]);
        assert!(hook.subscribed_to(WebhookEvent::Started));
        assert!(!hook.subscribed_to(WebhookEvent::Finished));
    }

    #[test]
    fn inactive_hooks_never_apply() {
        let mut hook =
            OutboundWebhook::new(ResourceId::new(), None, "https://example.com").unwrap();
        hook.active = false;
        assert!(!hook.applies_to(ResourceId::new()));
    }
}
