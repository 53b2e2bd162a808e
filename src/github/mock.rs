//! In-memory [`GitHubApi`] for tests.
//!
//! Serves canned pull requests, comments and milestones, records every write,
//! and can be told to fail specific operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use secrecy::SecretString;

use crate::matcher::Milestone;
use crate::reconcile::DiffStats;
use crate::types::{CommentId, InstallationId, PrNumber, RepoId, Sha};

use super::api::{
    GitHubApi, InstallationAuth, InstallationClient, IssueComment, NewPullRequest,
    PullRequestInfo, Reaction, Review,
};
use super::error::GitHubApiError;

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub pulls: HashMap<PrNumber, PullRequestInfo>,
    pub pull_commits: HashMap<PrNumber, Vec<Sha>>,
    pub reviews: HashMap<PrNumber, Vec<Review>>,
    pub comments: HashMap<PrNumber, Vec<IssueComment>>,
    pub milestones: Vec<Milestone>,
    pub repo_labels: Vec<String>,
    /// Diff stats reported for pull requests the bot opens.
    pub opened_pr_stats: DiffStats,
    pub next_pr: u64,
    pub next_comment: u64,
    pub failing: HashSet<&'static str>,

    pub created_prs: Vec<NewPullRequest>,
    pub body_updates: Vec<(PrNumber, String)>,
    pub requested_reviewers: Vec<(PrNumber, Vec<String>)>,
    pub added_labels: Vec<(PrNumber, Vec<String>)>,
    pub removed_labels: Vec<(PrNumber, String)>,
    pub milestones_set: Vec<(PrNumber, u64)>,
    pub assignees: Vec<(PrNumber, Vec<String>)>,
    pub posted_comments: Vec<(PrNumber, String)>,
    pub reactions: Vec<(CommentId, Reaction)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeGitHub {
    state: Arc<Mutex<FakeState>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state();
            state.next_pr = 1000;
            state.next_comment = 5000;
        }
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Makes every call to `operation` fail with a permanent error.
    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    pub fn add_pull(&self, info: PullRequestInfo, commits: Vec<Sha>) {
        let mut state = self.state();
        state.pull_commits.insert(info.number, commits);
        state.pulls.insert(info.number, info);
    }

    pub fn add_comment(&self, pr: PrNumber, comment: IssueComment) {
        self.state().comments.entry(pr).or_default().push(comment);
    }

    pub fn reactions(&self) -> Vec<(CommentId, Reaction)> {
        self.state().reactions.clone()
    }

    pub fn posted_comments(&self) -> Vec<(PrNumber, String)> {
        self.state().posted_comments.clone()
    }

    pub fn created_prs(&self) -> Vec<NewPullRequest> {
        self.state().created_prs.clone()
    }

    fn check(&self, operation: &'static str) -> Result<MutexGuard<'_, FakeState>, GitHubApiError> {
        let state = self.state();
        if state.failing.contains(operation) {
            return Err(GitHubApiError::with_status(
                422,
                format!("{} failed", operation),
            ));
        }
        Ok(state)
    }
}

fn not_found(pr: PrNumber) -> GitHubApiError {
    GitHubApiError::with_status(404, format!("pull request {} not found", pr))
}

impl GitHubApi for FakeGitHub {
    async fn get_pull_request(&self, pr: PrNumber) -> Result<PullRequestInfo, GitHubApiError> {
        let state = self.check("get_pull_request")?;
        state.pulls.get(&pr).cloned().ok_or_else(|| not_found(pr))
    }

    async fn list_pull_commits(&self, pr: PrNumber) -> Result<Vec<Sha>, GitHubApiError> {
        let state = self.check("list_pull_commits")?;
        state.pull_commits.get(&pr).cloned().ok_or_else(|| not_found(pr))
    }

    async fn list_reviews(&self, pr: PrNumber) -> Result<Vec<Review>, GitHubApiError> {
        let state = self.check("list_reviews")?;
        Ok(state.reviews.get(&pr).cloned().unwrap_or_default())
    }

    async fn request_reviewers(
        &self,
        pr: PrNumber,
        reviewers: &[String],
    ) -> Result<(), GitHubApiError> {
        let mut state = self.check("request_reviewers")?;
        state.requested_reviewers.push((pr, reviewers.to_vec()));
        Ok(())
    }

    async fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> Result<PrNumber, GitHubApiError> {
        let mut state = self.check("create_pull_request")?;
        state.next_pr += 1;
        let number = PrNumber(state.next_pr);
        let stats = state.opened_pr_stats;
        state.pulls.insert(
            number,
            PullRequestInfo {
                number,
                title: request.title.clone(),
                author: "backport-bot[bot]".to_string(),
                closed: false,
                merged: false,
                labels: Vec::new(),
                stats,
            },
        );
        state.created_prs.push(request.clone());
        Ok(number)
    }

    async fn update_pull_request_body(
        &self,
        pr: PrNumber,
        body: &str,
    ) -> Result<(), GitHubApiError> {
        let mut state = self.check("update_pull_request_body")?;
        state.body_updates.push((pr, body.to_string()));
        Ok(())
    }

    async fn list_milestones(&self) -> Result<Vec<Milestone>, GitHubApiError> {
        let state = self.check("list_milestones")?;
        Ok(state.milestones.clone())
    }

    async fn set_milestone(&self, pr: PrNumber, milestone: u64) -> Result<(), GitHubApiError> {
        let mut state = self.check("set_milestone")?;
        state.milestones_set.push((pr, milestone));
        Ok(())
    }

    async fn list_repo_labels(&self) -> Result<Vec<String>, GitHubApiError> {
        let state = self.check("list_repo_labels")?;
        Ok(state.repo_labels.clone())
    }

    async fn add_labels(&self, pr: PrNumber, labels: &[String]) -> Result<(), GitHubApiError> {
        let mut state = self.check("add_labels")?;
        state.added_labels.push((pr, labels.to_vec()));
        Ok(())
    }

    async fn remove_label(&self, pr: PrNumber, label: &str) -> Result<(), GitHubApiError> {
        let mut state = self.check("remove_label")?;
        state.removed_labels.push((pr, label.to_string()));
        Ok(())
    }

    async fn add_assignees(
        &self,
        pr: PrNumber,
        assignees: &[String],
    ) -> Result<(), GitHubApiError> {
        let mut state = self.check("add_assignees")?;
        state.assignees.push((pr, assignees.to_vec()));
        Ok(())
    }

    async fn create_comment(&self, pr: PrNumber, body: &str) -> Result<CommentId, GitHubApiError> {
        let mut state = self.check("create_comment")?;
        state.next_comment += 1;
        let id = CommentId(state.next_comment);
        state.posted_comments.push((pr, body.to_string()));
        Ok(id)
    }

    async fn list_comments(&self, pr: PrNumber) -> Result<Vec<IssueComment>, GitHubApiError> {
        let state = self.check("list_comments")?;
        Ok(state.comments.get(&pr).cloned().unwrap_or_default())
    }

    async fn add_reaction(
        &self,
        comment: CommentId,
        reaction: Reaction,
    ) -> Result<(), GitHubApiError> {
        let mut state = self.check("add_reaction")?;
        state.reactions.push((comment, reaction));
        Ok(())
    }
}

/// Hands out clones of one [`FakeGitHub`].
#[derive(Debug, Clone)]
pub(crate) struct FakeAuth {
    pub github: FakeGitHub,
    pub fail: bool,
}

impl FakeAuth {
    pub fn new(github: FakeGitHub) -> Self {
        Self {
            github,
            fail: false,
        }
    }
}

impl InstallationAuth for FakeAuth {
    type Client = FakeGitHub;

    async fn authenticate(
        &self,
        _installation: InstallationId,
        _repo: &RepoId,
    ) -> Result<InstallationClient<FakeGitHub>, GitHubApiError> {
        if self.fail {
            return Err(GitHubApiError::with_status(401, "Bad credentials"));
        }
        Ok(InstallationClient {
            client: self.github.clone(),
            token: SecretString::from("test-token"),
        })
    }
}

/// A merged pull request with the given commits.
pub(crate) fn merged_pull(number: u64, title: &str, labels: &[&str]) -> PullRequestInfo {
    PullRequestInfo {
        number: PrNumber(number),
        title: title.to_string(),
        author: "alice".to_string(),
        closed: true,
        merged: true,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        stats: DiffStats::default(),
    }
}

pub(crate) fn comment(id: u64, body: &str, association: &str) -> IssueComment {
    IssueComment {
        id: CommentId(id),
        body: body.to_string(),
        author: "bob".to_string(),
        author_association: association.to_string(),
        confused_reactions: 0,
    }
}
