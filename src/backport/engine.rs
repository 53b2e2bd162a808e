//! The backport pipeline for one request.
//!
//! ```text
//! START → WORKSPACE_READY → CHERRY_PICKED → PUSHED → PR_OPENED → ANNOTATED → SUCCEEDED
//!   └──────────────┴────────────┴────────────┴──────────┴──→ FAILED
//! ```
//!
//! Steps up to opening the pull request are fatal: the first failure ends the
//! task with a `-1` reaction and a comment explaining how to backport by hand.
//! Steps after it (reviewers, labels, milestone, assignee, annotation) only log
//! their failures. The task workspace is destroyed whatever happens.
//!
//! Git runs on the blocking thread pool; reactions are fired in the background
//! and collected before the task returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::git::cherry_pick::{CherryPickOutcome, FallbackStrategy, cherry_pick_commits};
use crate::git::inspect::{commit_title, has_diff, has_empty_commits, has_skip_ci_commits};
use crate::git::push::force_push_branch;
use crate::git::workspace::{
    TaskWorkspace, WorkspaceError, create_task_workspace, ensure_cached_clone, fetch_pull_ref,
};
use crate::git::{GitConfig, GitResult};
use crate::github::{
    GitHubApi, InstallationAuth, InstallationClient, NewPullRequest, Reaction,
    approving_reviewers,
};
use crate::matcher::{labels_for_backport, milestone_for_branch};
use crate::queue::TaskRunner;
use crate::reconcile::{Signals, compose_body, failure_comment_body, initial_body};
use crate::types::{BackportRequest, CommentId, PrNumber};

use super::error::{AnnotationError, BackportError};

/// Runs backport requests end to end.
pub struct BackportEngine<A> {
    auth: A,
    git: GitConfig,
    strategy: FallbackStrategy,
}

impl<A: InstallationAuth> BackportEngine<A> {
    pub fn new(auth: A, git: GitConfig, strategy: FallbackStrategy) -> Self {
        BackportEngine {
            auth,
            git,
            strategy,
        }
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn git_config(&self) -> &GitConfig {
        &self.git
    }

    /// Runs one backport and reports the outcome on the triggering comment.
    ///
    /// Returns the number of the opened pull request.
    #[instrument(skip_all, fields(
        repo = %request.repo(),
        pr = %request.source_pr(),
        branch = %request.target_branch(),
    ))]
    pub async fn run_task(&self, request: &BackportRequest) -> Result<PrNumber, BackportError> {
        let origin = request.origin();
        let InstallationClient { client, token } =
            match self.auth.authenticate(origin.installation, &origin.repo).await {
                Ok(installation) => installation,
                Err(e) => {
                    // Without a client there is nobody to tell.
                    error!(error = %e, "Failed to authenticate, backport not started");
                    return Err(BackportError::Authentication(e));
                }
            };
        let client = Arc::new(client);
        let mut notifications = JoinSet::new();

        react(&mut notifications, &client, origin.comment_id, Reaction::ThumbsUp);

        let result = self.execute(client.as_ref(), &token, request).await;

        match &result {
            Ok(number) => {
                info!(backport_pr = %number, "Backport succeeded");
                react(&mut notifications, &client, origin.comment_id, Reaction::Hooray);
            }
            Err(e) => {
                error!(error = %e, "Backport failed");
                react(&mut notifications, &client, origin.comment_id, Reaction::ThumbsDown);
                report_failure(client.as_ref(), request, e).await;
            }
        }

        while notifications.join_next().await.is_some() {}
        result
    }

    async fn execute(
        &self,
        client: &A::Client,
        token: &SecretString,
        request: &BackportRequest,
    ) -> Result<PrNumber, BackportError> {
        let workspace = self.prepare_workspace(request).await?;
        let result = self
            .backport_in(client, token, request, workspace.path().to_path_buf())
            .await;
        self.destroy_workspace(workspace).await;
        result
    }

    async fn prepare_workspace(
        &self,
        request: &BackportRequest,
    ) -> Result<TaskWorkspace, BackportError> {
        let git = self.git.clone();
        let repo = request.repo().clone();
        let target = request.target_branch().clone();
        let branch = request.backport_branch();
        let source_pr = request.source_pr();

        let workspace = blocking(move || -> Result<TaskWorkspace, WorkspaceError> {
            let clone_dir = ensure_cached_clone(&git, &repo)?;
            let workspace = create_task_workspace(&git, &clone_dir, &target, &branch)?;
            // Squash-merged pull requests' commits only live under the pull ref.
            if let Err(e) = fetch_pull_ref(&git, &clone_dir, source_pr) {
                warn!(error = %e, "Could not fetch pull request head");
            }
            Ok(workspace)
        })
        .await??;

        Ok(workspace)
    }

    async fn destroy_workspace(&self, workspace: TaskWorkspace) {
        match blocking(move || workspace.destroy()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to remove task workspace"),
            Err(e) => warn!(error = %e, "Task workspace cleanup did not complete"),
        }
    }

    async fn backport_in(
        &self,
        client: &A::Client,
        token: &SecretString,
        request: &BackportRequest,
        path: PathBuf,
    ) -> Result<PrNumber, BackportError> {
        let branch = request.backport_branch();
        let target = request.target_branch();

        // Cherry-pick
        let outcome = {
            let git = self.git.clone();
            let path = path.clone();
            let commits = request.commits().to_vec();
            let strategy = self.strategy;
            blocking(move || cherry_pick_commits(&git, &path, &commits, strategy))
                .await?
                .map_err(BackportError::CherryPickFailed)?
        };
        if !outcome.skipped.is_empty() {
            let skipped: Vec<&str> = outcome.skipped.iter().map(|c| c.short()).collect();
            warn!(?skipped, "Some commits could not be applied");
        }

        // Guard against no-op backports
        let changed = {
            let git = self.git.clone();
            let path = path.clone();
            let base = format!("origin/{}", target);
            blocking(move || has_diff(&git, &path, &base, "HEAD"))
                .await?
                .map_err(BackportError::DiffCheckFailed)?
        };
        if !changed {
            return Err(BackportError::NoChanges);
        }

        // Push
        {
            let git = self.git.clone();
            let path = path.clone();
            let repo = request.repo().clone();
            let push_branch = branch.clone();
            let token = token.expose_secret().to_owned();
            blocking(move || force_push_branch(&git, &path, &repo, &push_branch, &token))
                .await?
                .map_err(|source| BackportError::PushFailed {
                    branch: branch.clone(),
                    source,
                })?;
        }

        // Open the pull request
        let title = self.pull_request_title(request, &path).await;
        let new_pr = NewPullRequest {
            title: format!("[{}] {}", target, title),
            head: branch.clone(),
            base: target.to_string(),
            body: initial_body(request.source_pr()),
            draft: outcome.had_conflicts(),
            maintainer_can_modify: true,
        };
        let number = client
            .create_pull_request(&new_pr)
            .await
            .map_err(BackportError::PullRequestCreationFailed)?;
        info!(backport_pr = %number, draft = new_pr.draft, "Opened backport pull request");

        settle(
            "request_reviewers",
            request_reviewers(client, request, number).await,
        );
        settle("copy_labels", copy_labels(client, request, number).await);
        settle("set_milestone", set_milestone(client, request, number).await);
        settle("assign_author", assign_author(client, request, number).await);
        settle(
            "annotate",
            self.annotate(client, request, number, &outcome, &path).await,
        );

        Ok(number)
    }

    /// The single commit's subject for single-commit requests, otherwise the
    /// source pull request's title.
    async fn pull_request_title(&self, request: &BackportRequest, path: &Path) -> String {
        let fallback = request.origin().source_title.clone();
        if request.is_full_request() {
            return fallback;
        }
        let [commit] = request.commits() else {
            return fallback;
        };

        let git = self.git.clone();
        let path = path.to_path_buf();
        let commit = commit.clone();
        let title = async {
            Ok::<_, AnnotationError>(blocking(move || commit_title(&git, &path, &commit)).await??)
        }
        .await;

        match title {
            Ok(Some(title)) => title,
            Ok(None) => fallback,
            Err(e) => {
                warn!(error = %e, "Could not read commit title, using the pull request's");
                fallback
            }
        }
    }

    /// Rewrites the pull request body if the backport needs a closer look.
    async fn annotate(
        &self,
        client: &A::Client,
        request: &BackportRequest,
        number: PrNumber,
        outcome: &CherryPickOutcome,
        path: &Path,
    ) -> Result<(), AnnotationError> {
        let source = client.get_pull_request(request.source_pr()).await?;
        let backport = client.get_pull_request(number).await?;

        let git = self.git.clone();
        let path = path.to_path_buf();
        let count = request.commits().len();
        let (empty_commits, skip_ci) = blocking(move || -> GitResult<(bool, bool)> {
            Ok((
                has_empty_commits(&git, &path, count)?,
                has_skip_ci_commits(&git, &path, count)?,
            ))
        })
        .await??;

        let signals = Signals {
            conflicts: outcome.had_conflicts(),
            diff_changed: Signals::diff_changed(
                &source.stats,
                &backport.stats,
                request.is_full_request(),
            ),
            empty_commits,
            skip_ci,
        };
        debug!(?signals, "Computed reconciliation signals");

        if let Some(body) = compose_body(request.source_pr(), &signals, self.strategy) {
            client.update_pull_request_body(number, &body).await?;
            info!(backport_pr = %number, "Annotated backport pull request");
        }
        Ok(())
    }
}

impl<A: InstallationAuth> TaskRunner for BackportEngine<A> {
    type Output = PrNumber;
    type Error = BackportError;

    async fn run(&self, request: Arc<BackportRequest>) -> Result<PrNumber, BackportError> {
        self.run_task(&request).await
    }
}

/// Asks the source pull request's approvers and author to review.
async fn request_reviewers<C: GitHubApi>(
    client: &C,
    request: &BackportRequest,
    number: PrNumber,
) -> Result<(), AnnotationError> {
    let reviews = client.list_reviews(request.source_pr()).await?;
    let mut reviewers = approving_reviewers(&reviews);
    let author = &request.origin().author;
    if !author.is_empty() && !reviewers.contains(author) {
        reviewers.push(author.clone());
    }
    if reviewers.is_empty() {
        return Ok(());
    }

    client.request_reviewers(number, &reviewers).await?;
    info!(?reviewers, "Requested reviews");
    Ok(())
}

async fn copy_labels<C: GitHubApi>(
    client: &C,
    request: &BackportRequest,
    number: PrNumber,
) -> Result<(), AnnotationError> {
    let source = client.get_pull_request(request.source_pr()).await?;
    let repo_labels = client.list_repo_labels().await?;
    let labels = labels_for_backport(&source.labels, &repo_labels);
    if labels.is_empty() {
        return Ok(());
    }

    client.add_labels(number, &labels).await?;
    info!(?labels, "Added labels");
    Ok(())
}

async fn set_milestone<C: GitHubApi>(
    client: &C,
    request: &BackportRequest,
    number: PrNumber,
) -> Result<(), AnnotationError> {
    let milestones = client.list_milestones().await?;
    match milestone_for_branch(request.target_branch().as_str(), &milestones)? {
        Some(milestone) => {
            client.set_milestone(number, milestone.number).await?;
            info!(milestone = %milestone.title, "Set milestone");
        }
        None => debug!("No milestone matches the target branch"),
    }
    Ok(())
}

async fn assign_author<C: GitHubApi>(
    client: &C,
    request: &BackportRequest,
    number: PrNumber,
) -> Result<(), AnnotationError> {
    let author = &request.origin().author;
    if author.is_empty() {
        return Ok(());
    }
    client
        .add_assignees(number, std::slice::from_ref(author))
        .await?;
    Ok(())
}

/// Posts the manual-backport instructions on the source pull request.
async fn report_failure<C: GitHubApi>(client: &C, request: &BackportRequest, error: &BackportError) {
    let body = failure_comment_body(
        request.target_branch(),
        &request.backport_branch(),
        request.commits(),
        Some(&error.to_string()),
    );
    if let Err(e) = client.create_comment(request.source_pr(), &body).await {
        error!(error = %e, "Failed to post failure comment");
    }
}

/// Logs a non-fatal step failure.
fn settle(step: &'static str, result: Result<(), AnnotationError>) {
    if let Err(e) = result {
        warn!(step, error = %e, "Step failed, continuing");
    }
}

/// Adds a reaction in the background; failures are only logged.
fn react<C: GitHubApi + 'static>(
    tasks: &mut JoinSet<()>,
    client: &Arc<C>,
    comment: CommentId,
    reaction: Reaction,
) {
    let client = Arc::clone(client);
    tasks.spawn(async move {
        if let Err(e) = client.add_reaction(comment, reaction).await {
            warn!(%comment, reaction = reaction.as_api_str(), error = %e, "Failed to add reaction");
        }
    });
}

async fn blocking<T, F>(f: F) -> Result<T, JoinError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await
}
