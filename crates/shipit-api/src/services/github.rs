//! GitHub commit lookups for skip detection and changesets.

use async_trait::async_trait;
use serde::Deserialize;
use shipit_core::scm::{CommitData, SourceControl};
use shipit_core::{Error, Result};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Minimal GitHub client backing the `SourceControl` seam.
pub struct GitHubSourceControl {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubSourceControl {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            token,
        }
    }

    /// Configure from `GITHUB_TOKEN`; `None` when unset so callers can fall
    /// back to a null SCM.
    pub fn from_env() -> Option<Self> {
        std::env::var("GITHUB_TOKEN").ok().map(|token| Self::new(Some(token)))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct CommitPayload {
    sha: String,
    commit: CommitDetails,
}

#[derive(Debug, Deserialize)]
struct CommitDetails {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: Option<String>,
}

#[async_trait]
impl SourceControl for GitHubSourceControl {
    async fn commit(&self, repository: &str, sha: &str) -> Result<CommitData> {
        let url = format!("{}/repos/{}/commits/{}", self.api_base, repository, sha);
        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "shipit")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Internal(format!("github request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("commit {repository}@{sha}")));
        }
        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "github returned {} for {repository}@{sha}",
                response.status()
            )));
        }

        let payload: CommitPayload = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("github response: {e}")))?;
        Ok(CommitData {
            sha: payload.sha,
            message: payload.commit.message,
            author_name: payload.commit.author.and_then(|a| a.name),
        })
    }
}
