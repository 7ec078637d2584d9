//! Deploy lifecycle events and the hook registry.
//!
//! External integrations (webhook dispatch, error reporting, chat notifiers)
//! register handlers instead of monkey-patching the deploy path: a typed
//! event enum with an ordered list of handlers invoked synchronously in
//! registration order. Handlers must be cheap; anything slow should forward
//! the event onto its own channel.

use serde::Serialize;
use std::sync::RwLock;

use crate::ResourceId;
use crate::job::JobStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    /// Deploy and job records created.
    Created { deploy_id: ResourceId },
    /// Held in pending until a buddy approves.
    PendingApproval { deploy_id: ResourceId },
    /// Accepted by the execution engine.
    Queued { deploy_id: ResourceId },
    /// The underlying process started.
    Started { deploy_id: ResourceId },
    /// Reached a terminal status.
    Finished {
        deploy_id: ResourceId,
        status: JobStatus,
    },
}

impl DeployEvent {
    pub fn deploy_id(&self) -> ResourceId {
        match self {
            DeployEvent::Created { deploy_id }
            | DeployEvent::PendingApproval { deploy_id }
            | DeployEvent::Queued { deploy_id }
            | DeployEvent::Started { deploy_id }
            | DeployEvent::Finished { deploy_id, .. } => *deploy_id,
        }
    }
}

type Handler = Box<dyn Fn(&DeployEvent) + Send + Sync>;

/// Ordered registry of lifecycle event handlers.
#[derive(Default)]
pub struct Hooks {
    handlers: RwLock<Vec<Handler>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, handler: F)
    where
        F: Fn(&DeployEvent) + Send + Sync + 'static,
    {
        self.handlers.write().expect("hooks lock").push(Box::new(handler));
    }

    pub fn fire(&self, event: &DeployEvent) {
        for handler in self.handlers.read().expect("hooks lock").iter() {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_run_in_registration_order() {
        let hooks = Hooks::new();
        let seen = Arc::new(RwLock::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            hooks.register(move |_| seen.write().unwrap().push(i));
        }

        hooks.fire(&DeployEvent::Created {
            deploy_id: ResourceId::new(),
        });
        assert_eq!(*seen.read().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn fire_reaches_every_handler() {
        let hooks = Hooks::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = count.clone();
            hooks.register(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        hooks.fire(&DeployEvent::Started {
            deploy_id: ResourceId::new(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
