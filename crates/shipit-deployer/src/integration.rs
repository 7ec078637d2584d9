//! Inbound CI integration.
//!
//! A CI system reports build results; a passing "stop" event for a project's
//! repository triggers deploys to every auto-deploy stage, unless the commit
//! message opts out with a skip token. Deploys created this way run as a
//! synthetic integration user so they are distinguishable in history.

use serde::Deserialize;
use shipit_core::deploy::Deploy;
use shipit_core::scm::SourceControl;
use shipit_core::user::Role;
use shipit_core::{changeset, Error, Result};
use shipit_store::Stores;
use std::sync::Arc;
use tracing::{info, warn};

use crate::service::DeployService;

pub const INTEGRATION_USER_EMAIL: &str = "integration@shipit.local";
pub const INTEGRATION_USER_NAME: &str = "CI Integration";

/// Build-result payload posted by the CI system.
#[derive(Debug, Clone, Deserialize)]
pub struct CiPayload {
    pub status: String,
    pub event: String,
    pub branch: String,
    pub commit_id: String,
    pub repository: CiRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiRepository {
    pub org_name: String,
    pub name: String,
}

/// What the adapter did with a payload.
#[derive(Debug)]
pub enum CiOutcome {
    Deployed(Vec<Deploy>),
    Ignored(&'static str),
}

pub struct CiIntegration {
    stores: Stores,
    service: Arc<DeployService>,
    scm: Arc<dyn SourceControl>,
}

impl CiIntegration {
    pub fn new(stores: Stores, service: Arc<DeployService>, scm: Arc<dyn SourceControl>) -> Self {
        Self {
            stores,
            service,
            scm,
        }
    }

    pub async fn handle(&self, payload: &CiPayload) -> Result<CiOutcome> {
        if payload.status != "passed" || payload.event != "stop" {
            return Ok(CiOutcome::Ignored("not a passing build completion"));
        }

        let project = self
            .stores
            .projects
            .find_by_repository(&payload.repository.org_name, &payload.repository.name)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no project for repository {}/{}",
                    payload.repository.org_name, payload.repository.name
                ))
            })?;

        if self.commit_wants_skip(&project.repository_full_name(), &payload.commit_id).await {
            info!(
                project = %project.permalink,
                commit = %payload.commit_id,
                "Commit opted out of auto-deploy"
            );
            return Ok(CiOutcome::Ignored("deploy skip requested by commit"));
        }

        let stages = self.stores.stages.list_auto_deploy(project.id).await?;
        if stages.is_empty() {
            return Ok(CiOutcome::Ignored("no auto-deploy stages"));
        }

        let user = self
            .stores
            .users
            .find_or_create_by_email(INTEGRATION_USER_EMAIL, INTEGRATION_USER_NAME, Role::Deployer)
            .await?;

        let mut deploys = Vec::new();
        for stage in stages {
            match self
                .service
                .create_deploy(project.id, stage.id, &payload.branch, &user)
                .await
            {
                Ok(deploy) => {
                    info!(
                        deploy_id = %deploy.id,
                        stage = %stage.name,
                        branch = %payload.branch,
                        "Auto-deploy created"
                    );
                    deploys.push(deploy);
                }
                Err(e) => {
                    warn!(stage = %stage.name, error = %e, "Auto-deploy not created");
                }
            }
        }
        Ok(CiOutcome::Deployed(deploys))
    }

    /// Skip only on positive evidence. A failed commit lookup is logged and
    /// treated as "do not skip" so a flaky SCM host cannot block releases.
    async fn commit_wants_skip(&self, repository: &str, sha: &str) -> bool {
        match self.scm.commit(repository, sha).await {
            Ok(commit) => changeset::wants_skip(&commit.message),
            Err(e) => {
                warn!(repository = %repository, sha = %sha, error = %e, "Commit lookup failed, not skipping");
                false
            }
        }
    }
}
