//! Source-control collaborator interface.
//!
//! Only the small slice the deploy core needs: commit lookup for skip
//! detection and changeset summaries. Full API clients stay outside.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A commit as reported by the source-control host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitData {
    pub sha: String,
    pub message: String,
    pub author_name: Option<String>,
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Look up a commit by `owner/name` repository and SHA.
    async fn commit(&self, repository: &str, sha: &str) -> Result<CommitData>;
}

/// Source control stub for deployments without an SCM host configured.
/// Every lookup fails; callers are expected to degrade gracefully.
pub struct NullSourceControl;

#[async_trait]
impl SourceControl for NullSourceControl {
    async fn commit(&self, repository: &str, sha: &str) -> Result<CommitData> {
        Err(Error::NotFound(format!(
            "no source control configured (lookup {repository}@{sha})"
        )))
    }
}
