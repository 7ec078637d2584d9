//! Stage repository.

use async_trait::async_trait;
use shipit_core::ResourceId;
use shipit_core::stage::Stage;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait StageRepo: Send + Sync {
    async fn create(&self, stage: Stage) -> StoreResult<Stage>;
    async fn get(&self, id: ResourceId) -> StoreResult<Stage>;
    /// Stages of a project, ordered by position.
    async fn list_by_project(&self, project_id: ResourceId) -> StoreResult<Vec<Stage>>;
    /// Stages eligible for CI-triggered deploys.
    async fn list_auto_deploy(&self, project_id: ResourceId) -> StoreResult<Vec<Stage>>;
    async fn delete_by_project(&self, project_id: ResourceId) -> StoreResult<()>;
}

pub struct MemoryStageRepo {
    stages: RwLock<HashMap<ResourceId, Stage>>,
}

impl MemoryStageRepo {
    pub fn new() -> Self {
        Self {
            stages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStageRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageRepo for MemoryStageRepo {
    async fn create(&self, stage: Stage) -> StoreResult<Stage> {
        self.stages
            .write()
            .expect("stages lock")
            .insert(stage.id, stage.clone());
        Ok(stage)
    }

    async fn get(&self, id: ResourceId) -> StoreResult<Stage> {
        self.stages
            .read()
            .expect("stages lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("stage {id}")))
    }

    async fn list_by_project(&self, project_id: ResourceId) -> StoreResult<Vec<Stage>> {
        let mut stages: Vec<Stage> = self
            .stages
            .read()
            .expect("stages lock")
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| (s.position, s.created_at));
        Ok(stages)
    }

    async fn list_auto_deploy(&self, project_id: ResourceId) -> StoreResult<Vec<Stage>> {
        let stages = self.list_by_project(project_id).await?;
        Ok(stages.into_iter().filter(|s| s.auto_deploy).collect())
    }

    async fn delete_by_project(&self, project_id: ResourceId) -> StoreResult<()> {
        self.stages
            .write()
            .expect("stages lock")
            .retain(|_, s| s.project_id != project_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_ordered_by_position() {
        let repo = MemoryStageRepo::new();
        let project_id = ResourceId::new();

        let mut production = Stage::new(project_id, "production", "true");
        production.position = 1;
        let mut staging = Stage::new(project_id, "staging", "true");
        staging.position = 0;

        repo.create(production).await.unwrap();
        repo.create(staging).await.unwrap();

        let stages = repo.list_by_project(project_id).await.unwrap();
        assert_eq!(stages[0].name, "staging");
        assert_eq!(stages[1].name, "production");
    }

    #[tokio::test]
    async fn auto_deploy_filter() {
        let repo = MemoryStageRepo::new();
        let project_id = ResourceId::new();

        let mut auto = Stage::new(project_id, "staging", "true");
        auto.auto_deploy = true;
        repo.create(auto).await.unwrap();
        repo.create(Stage::new(project_id, "production", "true")).await.unwrap();

        let stages = repo.list_auto_deploy(project_id).await.unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].name, "staging");
    }
}
