//! Deploy repository.

use async_trait::async_trait;
use chrono::Utc;
use shipit_core::ResourceId;
use shipit_core::deploy::Deploy;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait DeployRepo: Send + Sync {
    async fn create(&self, deploy: Deploy) -> StoreResult<Deploy>;
    async fn get(&self, id: ResourceId) -> StoreResult<Deploy>;
    async fn find_by_job(&self, job_id: ResourceId) -> StoreResult<Option<Deploy>>;
    /// Persist buddy/cancellation bookkeeping changes.
    async fn update(&self, deploy: Deploy) -> StoreResult<Deploy>;
    /// Deploys of a project, newest first, 1-based page.
    async fn list_by_project(
        &self,
        project_id: ResourceId,
        page: usize,
        per_page: usize,
    ) -> StoreResult<Vec<Deploy>>;
    /// All deploys to a stage, newest first.
    async fn list_by_stage(&self, stage_id: ResourceId) -> StoreResult<Vec<Deploy>>;
    /// Most recent deploys across all projects.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Deploy>>;
    async fn delete_by_project(&self, project_id: ResourceId) -> StoreResult<()>;
}

pub struct MemoryDeployRepo {
    deploys: RwLock<HashMap<ResourceId, Deploy>>,
}

impl MemoryDeployRepo {
    pub fn new() -> Self {
        Self {
            deploys: RwLock::new(HashMap::new()),
        }
    }

    fn sorted_filtered<F>(&self, filter: F) -> Vec<Deploy>
    where
        F: Fn(&Deploy) -> bool,
    {
        let mut deploys: Vec<Deploy> = self
            .deploys
            .read()
            .expect("deploys lock")
            .values()
            .filter(|d| filter(d))
            .cloned()
            .collect();
        deploys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        deploys
    }
}

impl Default for MemoryDeployRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeployRepo for MemoryDeployRepo {
    async fn create(&self, deploy: Deploy) -> StoreResult<Deploy> {
        self.deploys
            .write()
            .expect("deploys lock")
            .insert(deploy.id, deploy.clone());
        Ok(deploy)
    }

    async fn get(&self, id: ResourceId) -> StoreResult<Deploy> {
        self.deploys
            .read()
            .expect("deploys lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("deploy {id}")))
    }

    async fn find_by_job(&self, job_id: ResourceId) -> StoreResult<Option<Deploy>> {
        Ok(self
            .deploys
            .read()
            .expect("deploys lock")
            .values()
            .find(|d| d.job_id == job_id)
            .cloned())
    }

    async fn update(&self, mut deploy: Deploy) -> StoreResult<Deploy> {
        let mut deploys = self.deploys.write().expect("deploys lock");
        if !deploys.contains_key(&deploy.id) {
            return Err(StoreError::NotFound(format!("deploy {}", deploy.id)));
        }
        deploy.updated_at = Utc::now();
        deploys.insert(deploy.id, deploy.clone());
        Ok(deploy)
    }

    async fn list_by_project(
        &self,
        project_id: ResourceId,
        page: usize,
        per_page: usize,
    ) -> StoreResult<Vec<Deploy>> {
        let deploys = self.sorted_filtered(|d| d.project_id == project_id);
        let offset = page.saturating_sub(1) * per_page;
        Ok(deploys.into_iter().skip(offset).take(per_page).collect())
    }

    async fn list_by_stage(&self, stage_id: ResourceId) -> StoreResult<Vec<Deploy>> {
        Ok(self.sorted_filtered(|d| d.stage_id == stage_id))
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Deploy>> {
        Ok(self.sorted_filtered(|_| true).into_iter().take(limit).collect())
    }

    async fn delete_by_project(&self, project_id: ResourceId) -> StoreResult<()> {
        self.deploys
            .write()
            .expect("deploys lock")
            .retain(|_, d| d.project_id != project_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_deploy(project_id: ResourceId, stage_id: ResourceId) -> Deploy {
        Deploy::new(
            project_id,
            stage_id,
            "main",
            ResourceId::new(),
            ResourceId::new(),
        )
    }

    #[tokio::test]
    async fn pagination_is_newest_first() {
        let repo = MemoryDeployRepo::new();
        let project_id = ResourceId::new();
        let stage_id = ResourceId::new();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let deploy = repo.create(make_deploy(project_id, stage_id)).await.unwrap();
            ids.push(deploy.id);
        }

        let page_one = repo.list_by_project(project_id, 1, 2).await.unwrap();
        assert_eq!(page_one.len(), 2);
        assert_eq!(page_one[0].id, ids[4]);

        let page_three = repo.list_by_project(project_id, 3, 2).await.unwrap();
        assert_eq!(page_three.len(), 1);
        assert_eq!(page_three[0].id, ids[0]);
    }

    #[tokio::test]
    async fn find_by_job_roundtrip() {
        let repo = MemoryDeployRepo::new();
        let deploy = repo
            .create(make_deploy(ResourceId::new(), ResourceId::new()))
            .await
            .unwrap();
        let found = repo.find_by_job(deploy.job_id).await.unwrap().unwrap();
        assert_eq!(found.id, deploy.id);
    }
}
