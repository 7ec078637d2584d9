//! Projects: deployable units owning stages, deploys and webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ResourceId,
    pub name: String,
    /// URL-safe slug, unique across projects.
    pub permalink: String,
    pub repository_url: String,
    /// Owner/org part of the source repository, used to match inbound CI payloads.
    pub repository_owner: String,
    /// Repository name part.
    pub repository_name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        repository_owner: impl Into<String>,
        repository_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let repository_owner = repository_owner.into();
        let repository_name = repository_name.into();
        Self {
            id: ResourceId::new(),
            permalink: permalink_for(&name),
            repository_url: format!(
                "https://github.com/{}/{}",
                repository_owner, repository_name
            ),
            name,
            repository_owner,
            repository_name,
            created_at: Utc::now(),
        }
    }

    /// `owner/name` as reported by CI systems.
    pub fn repository_full_name(&self) -> String {
        format!("{}/{}", self.repository_owner, self.repository_name)
    }
}

/// Derive a permalink slug from a project name.
pub fn permalink_for(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permalink_slugifies() {
        assert_eq!(permalink_for("My Cool App"), "my-cool-app");
        assert_eq!(permalink_for("  spaced  out  "), "spaced-out");
        assert_eq!(permalink_for("v2.0 (beta)"), "v2-0-beta");
    }

    #[test]
    fn repository_full_name_joins_owner_and_name() {
        let project = Project::new("Foo", "acme", "foo");
        assert_eq!(project.repository_full_name(), "acme/foo");
    }
}
