//! GitHub App authentication.
//!
//! The app authenticates with a JWT signed by its private key, then trades it
//! for short-lived installation tokens. The installation token drives both the
//! REST client and git pushes.

use std::path::{Path, PathBuf};

use octocrab::Octocrab;
use octocrab::models::{AppId, InstallationId as OctocrabInstallationId};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::types::{InstallationId, RepoId};

use super::api::{InstallationAuth, InstallationClient};
use super::client::OctocrabClient;
use super::error::GitHubApiError;
use super::retry::{RetryConfig, retry_with_backoff};

/// Webhook events the app must be subscribed to.
pub const REQUIRED_EVENTS: [&str; 2] = ["pull_request", "issue_comment"];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read private key {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),

    #[error("failed to build GitHub client: {0}")]
    Client(#[from] octocrab::Error),

    #[error(transparent)]
    Api(#[from] GitHubApiError),
}

/// The app's own metadata, from `GET /app`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub events: Vec<String>,
}

impl AppInfo {
    /// Required events the app is not subscribed to.
    pub fn missing_events(&self) -> Vec<&'static str> {
        REQUIRED_EVENTS
            .into_iter()
            .filter(|required| !self.events.iter().any(|e| e == required))
            .collect()
    }
}

/// A GitHub App identity able to mint installation clients.
#[derive(Clone)]
pub struct GitHubApp {
    app: Octocrab,
    retry: RetryConfig,
}

impl GitHubApp {
    pub fn new(app_id: u64, private_key_pem: &[u8]) -> Result<Self, AuthError> {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key_pem)?;
        let app = Octocrab::builder().app(AppId(app_id), key).build()?;
        Ok(Self {
            app,
            retry: RetryConfig::DEFAULT,
        })
    }

    pub fn from_key_file(app_id: u64, path: &Path) -> Result<Self, AuthError> {
        let pem = std::fs::read(path).map_err(|source| AuthError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(app_id, &pem)
    }

    /// Fetches the app's metadata.
    pub async fn app_info(&self) -> Result<AppInfo, GitHubApiError> {
        retry_with_backoff(self.retry, "app_info", || async {
            self.app
                .get::<AppInfo, _, _>("/app", None::<&()>)
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }
}

impl std::fmt::Debug for GitHubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubApp").finish_non_exhaustive()
    }
}

impl InstallationAuth for GitHubApp {
    type Client = OctocrabClient;

    async fn authenticate(
        &self,
        installation: InstallationId,
        repo: &RepoId,
    ) -> Result<InstallationClient<OctocrabClient>, GitHubApiError> {
        let (client, token) = retry_with_backoff(self.retry, "installation_token", || async {
            self.app
                .installation_and_token(OctocrabInstallationId(installation.0))
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await?;

        debug!(installation = installation.0, repo = %repo, "Authenticated as installation");

        Ok(InstallationClient {
            client: OctocrabClient::new(client, repo.clone()).with_retry(self.retry),
            token,
        })
    }
}
