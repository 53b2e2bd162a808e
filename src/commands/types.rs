//! Types for `/backport` commands.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BranchName, CommentId, RequestError, Sha};

/// A parsed `/backport` command from a pull request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackportCommand {
    /// Explicit commits to backport, in order.
    ///
    /// Empty for full requests (`/backport to <branch>`), meaning "all
    /// commits of the pull request". Intake resolves this before building a
    /// [`crate::types::BackportRequest`].
    pub commits: Vec<Sha>,

    /// The release branch to backport onto.
    pub branch: BranchName,

    /// Whether the command targets the whole pull request.
    pub is_full_request: bool,
}

/// A command found in a specific comment, used when collecting requests
/// from a pull request's comment history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentCommand {
    pub comment_id: CommentId,
    pub command: BackportCommand,
}

/// Errors from parsing a `/backport` command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The comment does not start with `/backport`.
    #[error("not a backport command")]
    NotACommand,

    /// A commit token is not 7 to 40 hex characters.
    #[error("Failed to extract commits from payload: `{body}`")]
    InvalidCommits { body: String },

    /// The target branch is missing or malformed.
    #[error(transparent)]
    InvalidBranch(#[from] RequestError),

    /// A partial request (`/backport <commits> to <branch>`) named no commits.
    #[error("No commits found in payload")]
    NoCommits,
}
