//! Octocrab client wrapper scoped to a specific repository.

use octocrab::Octocrab;

use crate::types::RepoId;

use super::retry::RetryConfig;

/// A GitHub API client scoped to a specific repository.
///
/// Every call made through it targets the same repository and is retried on
/// transient failures according to its [`RetryConfig`].
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    repo: RepoId,
    retry: RetryConfig,
}

impl OctocrabClient {
    /// Creates a new client scoped to the given repository.
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self {
            client,
            repo,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Overrides the retry behavior.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a reference to the underlying octocrab client.
    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    /// Returns the repository this client is scoped to.
    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    /// Builds a REST route under `/repos/<owner>/<repo>`.
    pub(crate) fn repo_route(&self, path: &str) -> String {
        format!("/repos/{}/{}/{}", self.repo.owner, self.repo.repo, path)
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}
