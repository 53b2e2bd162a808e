//! The GitHub operations the bot needs, as a trait.
//!
//! The orchestrator and intake only talk to GitHub through [`GitHubApi`], so
//! tests drive them against an in-memory fake. [`OctocrabClient`] is the real
//! implementation.
//!
//! [`OctocrabClient`]: super::OctocrabClient

use std::future::Future;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::matcher::Milestone;
use crate::reconcile::DiffStats;
use crate::types::{CommentId, InstallationId, PrNumber, RepoId, Sha};

use super::error::GitHubApiError;

/// Author association GitHub reports for users with no relation to the repository.
pub const ASSOCIATION_NONE: &str = "NONE";

/// Reaction types for GitHub comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    /// +1 / thumbs up
    ThumbsUp,
    /// -1 / thumbs down
    ThumbsDown,
    /// Hooray / tada
    Hooray,
    /// Confused
    Confused,
    /// Eyes
    Eyes,
}

impl Reaction {
    /// Returns the GitHub API content string for this reaction.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Reaction::ThumbsUp => "+1",
            Reaction::ThumbsDown => "-1",
            Reaction::Hooray => "hooray",
            Reaction::Confused => "confused",
            Reaction::Eyes => "eyes",
        }
    }
}

/// The parts of a pull request the bot looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestInfo {
    pub number: PrNumber,
    pub title: String,
    pub author: String,
    pub closed: bool,
    pub merged: bool,
    pub labels: Vec<String>,
    pub stats: DiffStats,
}

/// A pull request review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub reviewer: Option<String>,
    pub state: String,
    pub author_association: String,
}

/// A comment on an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub id: CommentId,
    pub body: String,
    pub author: String,
    pub author_association: String,
    /// Number of `confused` reactions on the comment.
    pub confused_reactions: u64,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
    pub draft: bool,
    pub maintainer_can_modify: bool,
}

/// Users who approved, excluding those with no association to the repo.
///
/// Deduplicated, in review order.
pub fn approving_reviewers(reviews: &[Review]) -> Vec<String> {
    let mut reviewers: Vec<String> = Vec::new();
    for review in reviews {
        if review.state != "APPROVED" || review.author_association == ASSOCIATION_NONE {
            continue;
        }
        if let Some(login) = &review.reviewer
            && !reviewers.contains(login)
        {
            reviewers.push(login.clone());
        }
    }
    reviewers
}

/// Repository-scoped GitHub operations.
///
/// Issue-level operations (labels, milestones, assignees, comments) take a
/// pull request number since every pull request is also an issue.
pub trait GitHubApi: Send + Sync {
    fn get_pull_request(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<PullRequestInfo, GitHubApiError>> + Send;

    /// Lists the commits of a pull request, oldest first.
    fn list_pull_commits(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<Vec<Sha>, GitHubApiError>> + Send;

    fn list_reviews(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<Vec<Review>, GitHubApiError>> + Send;

    fn request_reviewers(
        &self,
        pr: PrNumber,
        reviewers: &[String],
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> impl Future<Output = Result<PrNumber, GitHubApiError>> + Send;

    fn update_pull_request_body(
        &self,
        pr: PrNumber,
        body: &str,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    /// Lists the repository's open milestones.
    fn list_milestones(&self) -> impl Future<Output = Result<Vec<Milestone>, GitHubApiError>> + Send;

    fn set_milestone(
        &self,
        pr: PrNumber,
        milestone: u64,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    /// Lists the names of all labels defined in the repository.
    fn list_repo_labels(&self) -> impl Future<Output = Result<Vec<String>, GitHubApiError>> + Send;

    fn add_labels(
        &self,
        pr: PrNumber,
        labels: &[String],
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    fn remove_label(
        &self,
        pr: PrNumber,
        label: &str,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    fn add_assignees(
        &self,
        pr: PrNumber,
        assignees: &[String],
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    fn create_comment(
        &self,
        pr: PrNumber,
        body: &str,
    ) -> impl Future<Output = Result<CommentId, GitHubApiError>> + Send;

    fn list_comments(
        &self,
        pr: PrNumber,
    ) -> impl Future<Output = Result<Vec<IssueComment>, GitHubApiError>> + Send;

    fn add_reaction(
        &self,
        comment: CommentId,
        reaction: Reaction,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}

/// A client authenticated as an installation, plus the raw token for git.
pub struct InstallationClient<C> {
    pub client: C,
    pub token: SecretString,
}

/// Hands out installation-scoped clients.
pub trait InstallationAuth: Send + Sync + 'static {
    type Client: GitHubApi + 'static;

    fn authenticate(
        &self,
        installation: InstallationId,
        repo: &RepoId,
    ) -> impl Future<Output = Result<InstallationClient<Self::Client>, GitHubApiError>> + Send;
}
