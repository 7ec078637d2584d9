//! User repository. Backed externally in a real deployment; the deploy core
//! only needs find-or-create-by-email and id lookup.

use async_trait::async_trait;
use shipit_core::ResourceId;
use shipit_core::user::{Role, User};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{StoreError, StoreResult};

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get(&self, id: ResourceId) -> StoreResult<User>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Look up a user by email, creating them with the given name and role
    /// when absent. Deterministic for synthetic integration identities.
    async fn find_or_create_by_email(
        &self,
        email: &str,
        name: &str,
        role: Role,
    ) -> StoreResult<User>;
    async fn create(&self, user: User) -> StoreResult<User>;
}

pub struct MemoryUserRepo {
    users: RwLock<HashMap<ResourceId, User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn get(&self, id: ResourceId) -> StoreResult<User> {
        self.users
            .read()
            .expect("users lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .expect("users lock")
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_or_create_by_email(
        &self,
        email: &str,
        name: &str,
        role: Role,
    ) -> StoreResult<User> {
        let mut users = self.users.write().expect("users lock");
        if let Some(user) = users.values().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = User::new(name, email, role);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().expect("users lock");
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(format!("user email {}", user.email)));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let repo = MemoryUserRepo::new();
        let first = repo
            .find_or_create_by_email("ci@example.com", "CI", Role::Deployer)
            .await
            .unwrap();
        let second = repo
            .find_or_create_by_email("ci@example.com", "Renamed", Role::Admin)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "CI");
        assert_eq!(second.role, Role::Deployer);
    }
}
