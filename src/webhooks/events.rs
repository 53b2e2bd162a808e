//! GitHub webhook event types.
//!
//! The bot reacts to two deliveries:
//!
//! - `issue_comment` - a `/backport` command posted on a pull request
//! - `pull_request` - a pull request was merged, so pending commands can run

use serde::{Deserialize, Serialize};

use crate::types::{CommentId, DeliveryId, InstallationId, PrNumber, RepoId};

/// A parsed GitHub webhook event.
///
/// Events the bot has no use for are represented by the parser returning
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitHubEvent {
    /// A comment on an issue or pull request conversation tab.
    IssueComment(IssueCommentEvent),

    /// A pull request lifecycle change.
    PullRequest(PullRequestEvent),
}

impl GitHubEvent {
    pub fn repo_id(&self) -> &RepoId {
        match self {
            GitHubEvent::IssueComment(e) => &e.repo,
            GitHubEvent::PullRequest(e) => &e.repo,
        }
    }

    /// The app installation the delivery was sent for.
    pub fn installation(&self) -> InstallationId {
        match self {
            GitHubEvent::IssueComment(e) => e.installation,
            GitHubEvent::PullRequest(e) => e.installation,
        }
    }
}

/// A verified, parsed delivery waiting for intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// `X-GitHub-Delivery`.
    pub id: DeliveryId,
    pub event: GitHubEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
    Created,
    Edited,
    Deleted,
}

/// An issue comment event.
///
/// Comments on a pull request's conversation tab arrive as issue comments.
/// The `pr_*` fields describe the issue the comment was posted on, which is
/// only a pull request when `pr_number` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCommentEvent {
    pub installation: InstallationId,
    pub repo: RepoId,
    pub action: CommentAction,

    /// Set only when the comment was posted on a pull request.
    pub pr_number: Option<PrNumber>,
    pub pr_title: String,
    pub pr_author: String,
    pub pr_closed: bool,
    /// Derived from `issue.pull_request.merged_at`.
    pub pr_merged: bool,

    pub comment_id: CommentId,
    /// Empty for deleted comments.
    pub body: String,
    pub comment_author: String,
    /// `OWNER`, `MEMBER`, `CONTRIBUTOR`, `NONE`, ...
    pub author_association: String,
}

impl IssueCommentEvent {
    /// Closed without being merged. Backports of such pull requests are
    /// refused.
    pub fn is_closed_unmerged(&self) -> bool {
        self.pr_closed && !self.pr_merged
    }
}

/// Pull request actions the bot distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    /// Closed, merged or not.
    Closed,
    Reopened,
    Edited,
    Synchronize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub installation: InstallationId,
    pub repo: RepoId,
    pub action: PrAction,
    pub pr_number: PrNumber,
    pub title: String,
    pub author: String,
    pub merged: bool,
}

impl PullRequestEvent {
    pub fn is_merge(&self) -> bool {
        self.action == PrAction::Closed && self.merged
    }
}
