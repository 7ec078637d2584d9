//! Deploy lifecycle orchestration.

use shipit_core::deploy::Deploy;
use shipit_core::events::{DeployEvent, Hooks};
use shipit_core::job::{Job, JobStatus};
use shipit_core::reference::validate_reference;
use shipit_core::stage::Stage;
use shipit_core::user::User;
use shipit_core::{Error, ResourceId, Result};
use shipit_engine::JobEngine;
use shipit_store::Stores;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::buddy::{BuddyGate, BuddyVerdict};
use crate::locks::StageLocks;

/// Orchestrates deploy creation, approval and cancellation, and translates
/// engine job transitions into deploy lifecycle events.
pub struct DeployService {
    stores: Stores,
    engine: Arc<JobEngine>,
    gate: BuddyGate,
    locks: Arc<StageLocks>,
    hooks: Arc<Hooks>,
}

impl DeployService {
    pub fn new(
        stores: Stores,
        engine: Arc<JobEngine>,
        gate: BuddyGate,
        hooks: Arc<Hooks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stores,
            engine,
            gate,
            locks: Arc::new(StageLocks::new()),
            hooks,
        })
    }

    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    pub fn stage_locks(&self) -> &Arc<StageLocks> {
        &self.locks
    }

    /// Consume engine transitions in the background. Must be called once
    /// after construction; terminal transitions release stage locks and fire
    /// `DeployFinished`.
    pub fn start(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let mut transitions = service.engine.subscribe();
        tokio::spawn(async move {
            loop {
                match transitions.recv().await {
                    Ok(transition) => {
                        service
                            .on_job_transition(transition.job_id, transition.status)
                            .await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Deploy service lagged behind engine transitions");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Create a deploy of `reference` to a stage. The deploy either goes
    /// straight to the queue or stays pending behind the buddy check.
    pub async fn create_deploy(
        &self,
        project_id: ResourceId,
        stage_id: ResourceId,
        reference: &str,
        user: &User,
    ) -> Result<Deploy> {
        if !user.can_deploy() {
            return Err(Error::Forbidden(format!(
                "user {} may not deploy",
                user.email
            )));
        }
        validate_reference(reference)?;

        let stage = self.stores.stages.get(stage_id).await?;
        if stage.project_id != project_id {
            return Err(Error::NotFound(format!(
                "stage {stage_id} in project {project_id}"
            )));
        }

        let mut job = Job::new(&stage.command);
        job.env
            .insert("DEPLOY_REFERENCE".to_string(), reference.to_string());
        let job = self.stores.jobs.create(job).await?;

        let deploy = self
            .stores
            .deploys
            .create(Deploy::new(project_id, stage_id, reference, job.id, user.id))
            .await?;

        info!(
            deploy_id = %deploy.id,
            stage = %stage.name,
            reference = %reference,
            user = %user.email,
            "Deploy created"
        );
        self.hooks.fire(&DeployEvent::Created {
            deploy_id: deploy.id,
        });

        match self.gate.evaluate(&stage, reference, user).await? {
            BuddyVerdict::Required => {
                info!(deploy_id = %deploy.id, "Deploy held for buddy approval");
                self.hooks.fire(&DeployEvent::PendingApproval {
                    deploy_id: deploy.id,
                });
                Ok(deploy)
            }
            BuddyVerdict::NotRequired | BuddyVerdict::Bypassed => {
                if let Err(e) = self.confirm(&deploy, &stage).await {
                    // the caller never gets a handle to this deploy, so it
                    // must not linger as active
                    self.discard(deploy, &e).await;
                    return Err(e);
                }
                Ok(deploy)
            }
        }
    }

    /// Cancel a deploy that could not reach the queue, recording why.
    async fn discard(&self, mut deploy: Deploy, cause: &Error) {
        warn!(deploy_id = %deploy.id, cause = %cause, "Deploy discarded before queueing");
        deploy.canceled_reason = Some(cause.to_string());
        let job_id = deploy.job_id;
        if let Err(e) = self.stores.deploys.update(deploy.clone()).await {
            error!(deploy_id = %deploy.id, error = %e, "Failed to record discard reason");
        }
        if let Err(e) = self.stores.jobs.transition(job_id, JobStatus::Cancelled).await {
            error!(deploy_id = %deploy.id, error = %e, "Failed to cancel discarded job");
        }
    }

    /// Approve a pending deploy as the buddy. The approver must hold deploy
    /// rights and must not be the person who started the deploy.
    pub async fn approve(&self, deploy_id: ResourceId, buddy: &User) -> Result<Deploy> {
        if !buddy.can_deploy() {
            return Err(Error::Forbidden(format!(
                "user {} may not approve deploys",
                buddy.email
            )));
        }

        let mut deploy = self.stores.deploys.get(deploy_id).await?;
        if deploy.was_started_by(buddy) {
            return Err(Error::Forbidden(
                "deploys cannot be self-approved".to_string(),
            ));
        }

        let job = self.stores.jobs.get(deploy.job_id).await?;
        if job.status != JobStatus::Pending {
            return Err(Error::Conflict(format!(
                "deploy {deploy_id} is not awaiting approval"
            )));
        }

        deploy.buddy_id = Some(buddy.id);
        let deploy = self.stores.deploys.update(deploy).await?;

        let stage = self.stores.stages.get(deploy.stage_id).await?;
        info!(deploy_id = %deploy.id, buddy = %buddy.email, "Deploy approved");
        self.confirm(&deploy, &stage).await?;
        Ok(deploy)
    }

    /// Reject a pending deploy, recording why. A normal terminal transition
    /// to cancelled, not an error.
    pub async fn reject(&self, deploy_id: ResourceId, user: &User, reason: &str) -> Result<Deploy> {
        if !user.can_deploy() {
            return Err(Error::Forbidden(format!(
                "user {} may not reject deploys",
                user.email
            )));
        }

        let mut deploy = self.stores.deploys.get(deploy_id).await?;
        let job = self.stores.jobs.get(deploy.job_id).await?;
        if job.status != JobStatus::Pending {
            return Err(Error::Conflict(format!(
                "deploy {deploy_id} is not awaiting approval"
            )));
        }

        deploy.canceled_reason = Some(reason.to_string());
        let deploy = self.stores.deploys.update(deploy).await?;

        info!(deploy_id = %deploy.id, user = %user.email, reason = %reason, "Deploy rejected");
        self.engine.cancel(deploy.job_id).await?;
        Ok(deploy)
    }

    /// Cancel a deploy. Only the starter or an admin; anyone else gets
    /// Forbidden with no state change.
    pub async fn cancel(
        &self,
        deploy_id: ResourceId,
        user: &User,
        reason: Option<&str>,
    ) -> Result<Deploy> {
        let mut deploy = self.stores.deploys.get(deploy_id).await?;
        if !deploy.cancellable_by(user) {
            return Err(Error::Forbidden(format!(
                "only the deploy starter or an admin may cancel deploy {deploy_id}"
            )));
        }

        info!(deploy_id = %deploy.id, user = %user.email, "Deploy cancellation requested");
        self.engine.cancel(deploy.job_id).await?;

        // only record the reason once the engine has accepted the cancel; a
        // finished deploy must not carry one
        if let Some(reason) = reason {
            deploy.canceled_reason = Some(reason.to_string());
            deploy = self.stores.deploys.update(deploy).await?;
        }
        Ok(deploy)
    }

    /// Start a fresh deploy of the same stage and reference. Never mutates
    /// the original deploy.
    pub async fn redeploy(&self, deploy_id: ResourceId, user: &User) -> Result<Deploy> {
        let previous = self.stores.deploys.get(deploy_id).await?;
        self.create_deploy(
            previous.project_id,
            previous.stage_id,
            &previous.reference,
            user,
        )
        .await
    }

    /// Hand a deploy to the engine, taking the stage lock first unless the
    /// stage allows concurrent deploys.
    async fn confirm(&self, deploy: &Deploy, stage: &Stage) -> Result<()> {
        if !stage.allow_concurrent {
            self.locks.acquire(stage.id, deploy.id)?;
        }

        if let Err(e) = self.engine.enqueue(deploy.job_id).await {
            self.locks.release(stage.id, deploy.id);
            return Err(e);
        }

        self.hooks.fire(&DeployEvent::Queued {
            deploy_id: deploy.id,
        });
        Ok(())
    }

    /// React to a job status change coming out of the engine.
    async fn on_job_transition(&self, job_id: ResourceId, status: JobStatus) {
        let deploy = match self.stores.deploys.find_by_job(job_id).await {
            Ok(Some(deploy)) => deploy,
            Ok(None) => return,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Deploy lookup failed for job transition");
                return;
            }
        };

        match status {
            JobStatus::Running => {
                self.hooks.fire(&DeployEvent::Started {
                    deploy_id: deploy.id,
                });
            }
            status if status.is_terminal() => {
                self.locks.release(deploy.stage_id, deploy.id);
                info!(deploy_id = %deploy.id, status = %status, "Deploy finished");
                self.hooks.fire(&DeployEvent::Finished {
                    deploy_id: deploy.id,
                    status,
                });
            }
            _ => {}
        }
    }
}
