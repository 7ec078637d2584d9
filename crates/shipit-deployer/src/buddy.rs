//! Buddy-check gate: the four-eyes rule for sensitive stages.
//!
//! Stages marked `requires_approval` hold new deploys in pending until a
//! second person signs off. Two configurable bypasses exist, both off by
//! default: exempt roles, and a grace window in which an identical,
//! recently-successful deploy may be repeated without re-approval.

use chrono::{Duration as ChronoDuration, Utc};
use shipit_config::BuddyCheckConfig;
use shipit_core::job::JobStatus;
use shipit_core::stage::Stage;
use shipit_core::user::{Role, User};
use shipit_core::{ResourceId, Result};
use shipit_store::{DeployRepo, JobRepo};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct BuddyPolicy {
    /// Window in which a successful deploy of the same stage and reference
    /// may be repeated without a second approval.
    pub grace_period: Option<Duration>,
    /// Roles that may deploy approval-gated stages unattended.
    pub exempt_roles: Vec<Role>,
}

impl BuddyPolicy {
    pub fn from_config(config: &BuddyCheckConfig) -> Self {
        let exempt_roles = config
            .exempt_roles
            .iter()
            .filter_map(|name| match name.parse() {
                Ok(role) => Some(role),
                Err(e) => {
                    warn!(role = %name, error = %e, "Ignoring unknown exempt role");
                    None
                }
            })
            .collect();
        Self {
            grace_period: config.grace_period_secs.map(Duration::from_secs),
            exempt_roles,
        }
    }
}

/// Outcome of evaluating the gate for a new deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuddyVerdict {
    /// The stage does not require approval.
    NotRequired,
    /// Approval is required but a policy rule waives it for this deploy.
    Bypassed,
    /// The deploy must wait for a second approver.
    Required,
}

pub struct BuddyGate {
    policy: BuddyPolicy,
    deploys: Arc<dyn DeployRepo>,
    jobs: Arc<dyn JobRepo>,
}

impl BuddyGate {
    pub fn new(policy: BuddyPolicy, deploys: Arc<dyn DeployRepo>, jobs: Arc<dyn JobRepo>) -> Self {
        Self {
            policy,
            deploys,
            jobs,
        }
    }

    pub async fn evaluate(
        &self,
        stage: &Stage,
        reference: &str,
        requester: &User,
    ) -> Result<BuddyVerdict> {
        if !stage.requires_approval {
            return Ok(BuddyVerdict::NotRequired);
        }
        if self.policy.exempt_roles.contains(&requester.role) {
            return Ok(BuddyVerdict::Bypassed);
        }
        if let Some(grace) = self.policy.grace_period
            && self.recently_succeeded(stage.id, reference, grace).await?
        {
            return Ok(BuddyVerdict::Bypassed);
        }
        Ok(BuddyVerdict::Required)
    }

    /// Whether a deploy of `reference` to this stage succeeded within the
    /// grace window.
    async fn recently_succeeded(
        &self,
        stage_id: ResourceId,
        reference: &str,
        grace: Duration,
    ) -> Result<bool> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(grace)
                .unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 2));
        for deploy in self.deploys.list_by_stage(stage_id).await? {
            if deploy.reference != reference {
                continue;
            }
            let job = self.jobs.get(deploy.job_id).await?;
            if job.status == JobStatus::Succeeded
                && job.finished_at.is_some_and(|at| at > cutoff)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipit_core::deploy::Deploy;
    use shipit_core::job::Job;
    use shipit_store::{MemoryDeployRepo, MemoryJobRepo};

    fn gate(policy: BuddyPolicy) -> (BuddyGate, Arc<dyn DeployRepo>, Arc<dyn JobRepo>) {
        let deploys: Arc<dyn DeployRepo> = Arc::new(MemoryDeployRepo::new());
        let jobs: Arc<dyn JobRepo> = Arc::new(MemoryJobRepo::new());
        (
            BuddyGate::new(policy, Arc::clone(&deploys), Arc::clone(&jobs)),
            deploys,
            jobs,
        )
    }

    fn gated_stage() -> Stage {
        let mut stage = Stage::new(ResourceId::new(), "production", "true");
        stage.requires_approval = true;
        stage
    }

    #[tokio::test]
    async fn open_stage_needs_no_approval() {
        let (gate, _, _) = gate(BuddyPolicy::default());
        let stage = Stage::new(ResourceId::new(), "staging", "true");
        let user = User::new("d", "d@example.com", Role::Deployer);
        assert_eq!(
            gate.evaluate(&stage, "main", &user).await.unwrap(),
            BuddyVerdict::NotRequired
        );
    }

    #[tokio::test]
    async fn gated_stage_requires_approval_by_default() {
        let (gate, _, _) = gate(BuddyPolicy::default());
        let user = User::new("d", "d@example.com", Role::Deployer);
        assert_eq!(
            gate.evaluate(&gated_stage(), "main", &user).await.unwrap(),
            BuddyVerdict::Required
        );
    }

    #[tokio::test]
    async fn exempt_role_bypasses() {
        let policy = BuddyPolicy {
            exempt_roles: vec![Role::Admin],
            ..BuddyPolicy::default()
        };
        let (gate, _, _) = gate(policy);
        let stage = gated_stage();

        let admin = User::new("a", "a@example.com", Role::Admin);
        assert_eq!(
            gate.evaluate(&stage, "main", &admin).await.unwrap(),
            BuddyVerdict::Bypassed
        );

        let deployer = User::new("d", "d@example.com", Role::Deployer);
        assert_eq!(
            gate.evaluate(&stage, "main", &deployer).await.unwrap(),
            BuddyVerdict::Required
        );
    }

    #[tokio::test]
    async fn grace_window_covers_identical_redeploys() {
        let policy = BuddyPolicy {
            grace_period: Some(Duration::from_secs(3600)),
            ..BuddyPolicy::default()
        };
        let (gate, deploys, jobs) = gate(policy);
        let stage = gated_stage();
        let user = User::new("d", "d@example.com", Role::Deployer);

        // a successful deploy of v1 just finished
        let job = jobs.create(Job::new("true")).await.unwrap();
        jobs.transition(job.id, JobStatus::Queued).await.unwrap();
        jobs.transition(job.id, JobStatus::Running).await.unwrap();
        jobs.transition(job.id, JobStatus::Succeeded).await.unwrap();
        deploys
            .create(Deploy::new(
                stage.project_id,
                stage.id,
                "v1",
                job.id,
                user.id,
            ))
            .await
            .unwrap();

        assert_eq!(
            gate.evaluate(&stage, "v1", &user).await.unwrap(),
            BuddyVerdict::Bypassed
        );
        // a different reference still needs a buddy
        assert_eq!(
            gate.evaluate(&stage, "v2", &user).await.unwrap(),
            BuddyVerdict::Required
        );
    }

    #[tokio::test]
    async fn failed_deploys_do_not_open_the_window() {
        let policy = BuddyPolicy {
            grace_period: Some(Duration::from_secs(3600)),
            ..BuddyPolicy::default()
        };
        let (gate, deploys, jobs) = gate(policy);
        let stage = gated_stage();
        let user = User::new("d", "d@example.com", Role::Deployer);

        let job = jobs.create(Job::new("false")).await.unwrap();
        jobs.transition(job.id, JobStatus::Queued).await.unwrap();
        jobs.transition(job.id, JobStatus::Running).await.unwrap();
        jobs.transition(job.id, JobStatus::Failed).await.unwrap();
        deploys
            .create(Deploy::new(
                stage.project_id,
                stage.id,
                "v1",
                job.id,
                user.id,
            ))
            .await
            .unwrap();

        assert_eq!(
            gate.evaluate(&stage, "v1", &user).await.unwrap(),
            BuddyVerdict::Required
        );
    }

    #[test]
    fn policy_from_config_skips_unknown_roles() {
        let config = BuddyCheckConfig {
            grace_period_secs: Some(60),
            exempt_roles: vec!["admin".to_string(), "superuser".to_string()],
        };
        let policy = BuddyPolicy::from_config(&config);
        assert_eq!(policy.exempt_roles, vec![Role::Admin]);
        assert_eq!(policy.grace_period, Some(Duration::from_secs(60)));
    }
}
