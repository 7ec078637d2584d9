//! Project repository.

use async_trait::async_trait;
use shipit_core::ResourceId;
use shipit_core::project::Project;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn create(&self, project: Project) -> StoreResult<Project>;
    async fn get(&self, id: ResourceId) -> StoreResult<Project>;
    async fn find_by_permalink(&self, permalink: &str) -> StoreResult<Option<Project>>;
    /// Match a project by its source repository `owner` and `name`.
    async fn find_by_repository(&self, owner: &str, name: &str) -> StoreResult<Option<Project>>;
    async fn list(&self) -> StoreResult<Vec<Project>>;
    async fn delete(&self, id: ResourceId) -> StoreResult<()>;
}

pub struct MemoryProjectRepo {
    projects: RwLock<HashMap<ResourceId, Project>>,
}

impl MemoryProjectRepo {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryProjectRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectRepo for MemoryProjectRepo {
    async fn create(&self, project: Project) -> StoreResult<Project> {
        let mut projects = self.projects.write().expect("projects lock");
        if projects.values().any(|p| p.permalink == project.permalink) {
            return Err(StoreError::Duplicate(format!(
                "project permalink {}",
                project.permalink
            )));
        }
        projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get(&self, id: ResourceId) -> StoreResult<Project> {
        self.projects
            .read()
            .expect("projects lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
    }

    async fn find_by_permalink(&self, permalink: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .projects
            .read()
            .expect("projects lock")
            .values()
            .find(|p| p.permalink == permalink)
            .cloned())
    }

    async fn find_by_repository(&self, owner: &str, name: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .projects
            .read()
            .expect("projects lock")
            .values()
            .find(|p| p.repository_owner == owner && p.repository_name == name)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .read()
            .expect("projects lock")
            .values()
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn delete(&self, id: ResourceId) -> StoreResult<()> {
        self.projects
            .write()
            .expect("projects lock")
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
    }
}
