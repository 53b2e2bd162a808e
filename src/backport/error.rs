//! Backport task errors.
//!
//! [`BackportError`] covers the steps that abort a task; each one ends in a
//! failure comment on the source pull request. [`AnnotationError`] covers the
//! steps after the pull request is open, which are only logged.

use thiserror::Error;
use tokio::task::JoinError;

use crate::git::GitError;
use crate::git::workspace::WorkspaceError;
use crate::github::GitHubApiError;
use crate::matcher::InvalidBranchFormat;

/// A step failure that aborts the task.
#[derive(Debug, Error)]
pub enum BackportError {
    /// No installation token could be obtained.
    #[error("Failed to authenticate: {0}")]
    Authentication(#[source] GitHubApiError),

    /// Cloning, fetching or creating the worktree failed.
    #[error("Failed to set up the workspace: {0}")]
    WorkspaceSetupFailed(#[from] WorkspaceError),

    /// Git itself failed while applying commits (conflicts are not errors).
    #[error("Failed to cherry-pick commits: {0}")]
    CherryPickFailed(#[source] GitError),

    /// The backport branch is identical to the target branch.
    #[error("No changes found in backport branch")]
    NoChanges,

    /// Comparing the backport branch to the target branch failed.
    #[error("Failed to compare with the target branch: {0}")]
    DiffCheckFailed(#[source] GitError),

    #[error("Failed to push branch {branch}: {source}")]
    PushFailed {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("Failed to create pull request: {0}")]
    PullRequestCreationFailed(#[source] GitHubApiError),

    /// A blocking git step panicked or was cancelled.
    #[error("Git task did not complete: {0}")]
    Join(#[from] JoinError),
}

/// A failure in a step that does not abort the task.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error(transparent)]
    GitHub(#[from] GitHubApiError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Milestone(#[from] InvalidBranchFormat),

    #[error("Git task did not complete: {0}")]
    Join(#[from] JoinError),
}
