//! The backport request descriptor.
//!
//! A [`BackportRequest`] describes one unit of backport work: which commits of
//! which source pull request go onto which release branch, and who asked for
//! it. It is built once by intake (after resolving "all commits of the PR" to
//! a concrete list) and never changes afterwards; the task queue and the
//! orchestrator only ever see it through a shared reference.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{CommentId, InstallationId, PrNumber, RepoId, Sha};

static BRANCH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9_./-]{1,100}$").expect("static regex"));

/// Errors from building a request descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Branch name `{0}` is invalid")]
    InvalidBranch(String),

    /// The commit list was never resolved from the source pull request.
    #[error("no commits to backport for {0}")]
    NoCommits(PrNumber),
}

/// A validated target branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    pub fn parse(name: impl Into<String>) -> Result<Self, RequestError> {
        let name = name.into();
        if BRANCH_PATTERN.is_match(&name) {
            Ok(BranchName(name))
        } else {
            Err(RequestError::InvalidBranch(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BranchName::parse(value)
    }
}

impl From<BranchName> for String {
    fn from(value: BranchName) -> Self {
        value.0
    }
}

/// Provenance of a request: where it came from and who gets credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    pub installation: InstallationId,
    pub repo: RepoId,
    pub source_pr: PrNumber,
    pub source_title: String,
    /// Login of the source pull request's author.
    pub author: String,
    /// The `/backport` comment that triggered this request.
    pub comment_id: CommentId,
}

/// One backport unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackportRequest {
    origin: RequestOrigin,
    target_branch: BranchName,
    commits: Vec<Sha>,
    is_full_request: bool,
}

impl BackportRequest {
    /// Builds a request from an already-resolved commit list.
    ///
    /// Full requests must pass the source pull request's commits here; an
    /// empty list is rejected because the cherry-pick engine needs concrete
    /// commits.
    pub fn new(
        origin: RequestOrigin,
        target_branch: BranchName,
        commits: Vec<Sha>,
        is_full_request: bool,
    ) -> Result<Self, RequestError> {
        if commits.is_empty() {
            return Err(RequestError::NoCommits(origin.source_pr));
        }
        Ok(BackportRequest {
            origin,
            target_branch,
            commits,
            is_full_request,
        })
    }

    pub fn origin(&self) -> &RequestOrigin {
        &self.origin
    }

    pub fn repo(&self) -> &RepoId {
        &self.origin.repo
    }

    pub fn source_pr(&self) -> PrNumber {
        self.origin.source_pr
    }

    pub fn target_branch(&self) -> &BranchName {
        &self.target_branch
    }

    pub fn commits(&self) -> &[Sha] {
        &self.commits
    }

    pub fn is_full_request(&self) -> bool {
        self.is_full_request
    }

    /// The branch pushed for this request: `backport/<pr>/<target>`.
    pub fn backport_branch(&self) -> String {
        format!("backport/{}/{}", self.origin.source_pr.0, self.target_branch)
    }
}

#[cfg(test)]
pub(crate) fn test_origin() -> RequestOrigin {
    RequestOrigin {
        installation: InstallationId(1),
        repo: RepoId::new("nextcloud", "server"),
        source_pr: PrNumber(42),
        source_title: "Fix the thing".to_string(),
        author: "alice".to_string(),
        comment_id: CommentId(7),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn valid_branch_names_parse(name in "[a-zA-Z0-9_./-]{1,100}") {
            let parsed = BranchName::parse(name.clone()).unwrap();
            prop_assert_eq!(parsed.as_str(), name.as_str());
        }

        #[test]
        fn branch_names_with_spaces_are_rejected(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
            let name = format!("{} {}", a, b);
            prop_assert!(BranchName::parse(name).is_err());
        }
    }

    #[test]
    fn branch_name_length_limit() {
        assert!(BranchName::parse("a".repeat(100)).is_ok());
        assert!(BranchName::parse("a".repeat(101)).is_err());
        assert!(BranchName::parse("").is_err());
    }

    #[test]
    fn branch_error_message_names_the_branch() {
        let err = BranchName::parse("stable 28").unwrap_err();
        assert_eq!(err.to_string(), "Branch name `stable 28` is invalid");
    }

    #[test]
    fn backport_branch_format() {
        let request = BackportRequest::new(
            test_origin(),
            BranchName::parse("stable28").unwrap(),
            vec![Sha::new("0182735b")],
            false,
        )
        .unwrap();
        assert_eq!(request.backport_branch(), "backport/42/stable28");
    }

    #[test]
    fn empty_commit_list_is_rejected() {
        let err = BackportRequest::new(
            test_origin(),
            BranchName::parse("stable28").unwrap(),
            vec![],
            true,
        )
        .unwrap_err();
        assert_eq!(err, RequestError::NoCommits(PrNumber(42)));
    }

    #[test]
    fn branch_name_deserialize_validates() {
        assert!(serde_json::from_str::<BranchName>("\"stable28\"").is_ok());
        assert!(serde_json::from_str::<BranchName>("\"bad branch\"").is_err());
    }
}
