//! Deploy records: a request to release a reference to a stage, backed by
//! exactly one job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;
use crate::user::User;

/// A deploy binds a job to a project, stage and git reference.
///
/// The job carries the status state machine; the deploy contributes the
/// buddy-check phase (a pending job with unresolved approval) and the
/// who-started/who-approved bookkeeping. Redeploys never mutate an existing
/// record; they create a new deploy for the same stage and reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deploy {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub stage_id: ResourceId,
    /// Requested git reference (branch, tag or SHA).
    pub reference: String,
    pub job_id: ResourceId,
    pub started_by: ResourceId,
    /// Second approver, once the buddy check is satisfied.
    pub buddy_id: Option<ResourceId>,
    /// Recorded reason when the deploy was cancelled or rejected.
    pub canceled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deploy {
    pub fn new(
        project_id: ResourceId,
        stage_id: ResourceId,
        reference: impl Into<String>,
        job_id: ResourceId,
        started_by: ResourceId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ResourceId::new(),
            project_id,
            stage_id,
            reference: reference.into(),
            job_id,
            started_by,
            buddy_id: None,
            canceled_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn was_started_by(&self, user: &User) -> bool {
        self.started_by == user.id
    }

    /// Whether `user` may cancel this deploy: the starter, or an admin.
    pub fn cancellable_by(&self, user: &User) -> bool {
        self.was_started_by(user) || user.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{Role, User};

    #[test]
    fn only_starter_or_admin_may_cancel() {
        let starter = User::new("s", "s@example.com", Role::Deployer);
        let other = User::new("o", "o@example.com", Role::Deployer);
        let admin = User::new("a", "a@example.com", Role::Admin);

        let deploy = Deploy::new(
            ResourceId::new(),
            ResourceId::new(),
            "v1.2.3",
            ResourceId::new(),
            starter.id,
        );

        assert!(deploy.cancellable_by(&starter));
        assert!(!deploy.cancellable_by(&other));
        assert!(deploy.cancellable_by(&admin));
    }
}
