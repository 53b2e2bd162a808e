//! GitHub API access.
//!
//! Key features:
//! - [`GitHubApi`] trait over the repository operations the bot performs
//! - Octocrab-backed implementation with exponential backoff retry
//! - Distinguishes transient vs permanent errors
//! - GitHub App JWT authentication and installation tokens

mod api;
mod auth;
mod client;
mod error;
mod rest;
mod retry;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{
    ASSOCIATION_NONE, GitHubApi, InstallationAuth, InstallationClient, IssueComment,
    NewPullRequest, PullRequestInfo, Reaction, Review, approving_reviewers,
};
pub use auth::{AppInfo, AuthError, GitHubApp, REQUIRED_EVENTS};
pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
pub use retry::{RetryConfig, retry_create_with_backoff, retry_with_backoff};
