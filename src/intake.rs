//! Turns webhook events into queued backport requests.
//!
//! Two deliveries produce work:
//!
//! - a `/backport` comment on a pull request. If the pull request is already
//!   merged the request runs right away, otherwise the pull request is
//!   labelled and the command waits for the merge.
//! - a pull request being merged. Every pending `/backport` comment on it is
//!   collected, deduplicated per target branch and run.
//!
//! Feedback to the commenter is given through reactions on their comment.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::{
    CommandError, CommentCommand, is_backport_command, latest_per_branch, parse_backport_command,
};
use crate::config::owner_allowed;
use crate::github::{
    ASSOCIATION_NONE, GitHubApi, GitHubApiError, InstallationAuth, IssueComment, Reaction,
};
use crate::matcher::LABEL_BACKPORT_REQUEST;
use crate::queue::{Dispatcher, QueueError, TaskHandle, TaskRunner};
use crate::types::{BackportRequest, CommentId, PrNumber, RequestOrigin, Sha};
use crate::webhooks::{
    CommentAction, Delivery, GitHubEvent, IssueCommentEvent, PullRequestEvent,
};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Failed to authenticate: {0}")]
    Authentication(#[source] GitHubApiError),

    #[error("Failed to list comments on PR {pr}: {source}")]
    ListComments {
        pr: PrNumber,
        #[source]
        source: GitHubApiError,
    },
}

/// What intake did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Nothing to do.
    Ignored,
    /// The command was refused; the comment got this reaction.
    Refused(Reaction),
    /// The pull request is not merged yet. The command runs on merge.
    Deferred,
    /// Requests were queued and have finished.
    Processed { succeeded: usize, failed: usize },
}

/// Receives webhook events and feeds the task queues.
pub struct Intake<A: InstallationAuth, R: TaskRunner> {
    auth: A,
    dispatcher: Arc<Dispatcher<R>>,
    allowed_owners: Vec<String>,
}

impl<A, R> Intake<A, R>
where
    A: InstallationAuth,
    R: TaskRunner,
    R::Error: fmt::Display,
{
    pub fn new(auth: A, dispatcher: Arc<Dispatcher<R>>, allowed_owners: Vec<String>) -> Self {
        Intake {
            auth,
            dispatcher,
            allowed_owners,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<R>> {
        &self.dispatcher
    }

    /// Consumes deliveries until the channel closes or `shutdown` fires,
    /// then waits for the deliveries already being handled.
    ///
    /// Each delivery is handled on its own task, since handling a merge
    /// waits for its backports to finish.
    pub async fn run(
        self: Arc<Self>,
        mut deliveries: mpsc::Receiver<Delivery>,
        shutdown: CancellationToken,
    ) {
        let mut tasks = JoinSet::new();
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let intake = Arc::clone(&self);
            tasks.spawn(async move { intake.handle_delivery(delivery).await });
            while let Some(result) = tasks.try_join_next() {
                log_join(result);
            }
        }

        debug!(pending = tasks.len(), "Intake stopped, waiting for in-flight deliveries");
        while let Some(result) = tasks.join_next().await {
            log_join(result);
        }
    }

    #[instrument(skip_all, fields(delivery = %delivery.id))]
    async fn handle_delivery(&self, delivery: Delivery) {
        match self.handle_event(delivery.event).await {
            Ok(outcome) => debug!(?outcome, "Delivery handled"),
            Err(e) => error!(error = %e, "Failed to handle delivery"),
        }
    }

    #[instrument(skip_all, fields(repo = %event.repo_id()))]
    pub async fn handle_event(&self, event: GitHubEvent) -> Result<IntakeOutcome, IntakeError> {
        if !owner_allowed(&self.allowed_owners, &event.repo_id().owner) {
            info!("Ignoring event from owner outside the allowlist");
            return Ok(IntakeOutcome::Ignored);
        }

        match event {
            GitHubEvent::IssueComment(e) => self.handle_issue_comment(e).await,
            GitHubEvent::PullRequest(e) => self.handle_pull_request(e).await,
        }
    }

    /// Handles a newly created comment.
    #[instrument(skip_all, fields(comment = %event.comment_id))]
    pub async fn handle_issue_comment(
        &self,
        event: IssueCommentEvent,
    ) -> Result<IntakeOutcome, IntakeError> {
        if event.action != CommentAction::Created || !is_backport_command(&event.body) {
            return Ok(IntakeOutcome::Ignored);
        }
        let Some(pr) = event.pr_number else {
            debug!("Ignoring command on an issue");
            return Ok(IntakeOutcome::Ignored);
        };
        if !is_collaborator(&event.author_association) {
            info!(author = %event.comment_author, "Ignoring comment from non-collaborator");
            return Ok(IntakeOutcome::Ignored);
        }

        let client = self
            .auth
            .authenticate(event.installation, &event.repo)
            .await
            .map_err(IntakeError::Authentication)?
            .client;

        if event.is_closed_unmerged() {
            warn!(%pr, "Ignoring command on closed but unmerged pull request");
            react(&client, event.comment_id, Reaction::ThumbsDown).await;
            return Ok(IntakeOutcome::Refused(Reaction::ThumbsDown));
        }

        let command = match parse_backport_command(&event.body) {
            Ok(command) => command,
            Err(e) => {
                error!(%pr, error = %e, body = %event.body, "Failed to parse backport command");
                react(&client, event.comment_id, Reaction::Confused).await;
                return Ok(IntakeOutcome::Refused(Reaction::Confused));
            }
        };

        let origin = RequestOrigin {
            installation: event.installation,
            repo: event.repo.clone(),
            source_pr: pr,
            source_title: title_or_default(&event.pr_title, pr),
            author: event.pr_author.clone(),
            comment_id: event.comment_id,
        };
        let command = CommentCommand {
            comment_id: event.comment_id,
            command,
        };
        let request = match resolve_request(&client, origin, command, &mut None).await {
            Ok(request) => request,
            Err(e) => {
                error!(%pr, error = %e, "Failed to handle backport request");
                react(&client, event.comment_id, Reaction::ThumbsDown).await;
                return Ok(IntakeOutcome::Refused(Reaction::ThumbsDown));
            }
        };

        info!(
            %pr,
            branch = %request.target_branch(),
            commits = request.commits().len(),
            full = request.is_full_request(),
            merged = event.pr_merged,
            "Received backport request"
        );

        if !event.pr_merged {
            react(&client, event.comment_id, Reaction::Eyes).await;
        }

        if let Err(e) = client
            .add_labels(pr, &[LABEL_BACKPORT_REQUEST.to_string()])
            .await
        {
            warn!(%pr, error = %e, "Failed to label pull request");
        }

        if !event.pr_merged {
            info!(%pr, "Pull request not merged yet, waiting for merge");
            return Ok(IntakeOutcome::Deferred);
        }

        let outcome = self.run_all(vec![request]).await;
        if let IntakeOutcome::Processed { failed: 0, .. } = outcome {
            remove_request_label(&client, pr).await;
        }
        Ok(outcome)
    }

    /// Handles a pull request event; only merges matter.
    #[instrument(skip_all, fields(pr = %event.pr_number))]
    pub async fn handle_pull_request(
        &self,
        event: PullRequestEvent,
    ) -> Result<IntakeOutcome, IntakeError> {
        if !event.is_merge() {
            return Ok(IntakeOutcome::Ignored);
        }
        let pr = event.pr_number;

        let client = self
            .auth
            .authenticate(event.installation, &event.repo)
            .await
            .map_err(IntakeError::Authentication)?
            .client;

        let comments: Vec<IssueComment> = client
            .list_comments(pr)
            .await
            .map_err(|source| IntakeError::ListComments { pr, source })?
            .into_iter()
            .filter(is_pending_command)
            .collect();
        if comments.is_empty() {
            info!("Merged pull request has no backport requests");
            return Ok(IntakeOutcome::Ignored);
        }

        let mut commands = Vec::with_capacity(comments.len());
        for comment in &comments {
            match parse_backport_command(&comment.body) {
                Ok(command) => commands.push(CommentCommand {
                    comment_id: comment.id,
                    command,
                }),
                Err(e) => {
                    error!(comment = %comment.id, error = %e, body = %comment.body, "Failed to parse backport command");
                    react(&client, comment.id, Reaction::Confused).await;
                }
            }
        }
        let commands = latest_per_branch(commands);
        info!(
            total = comments.len(),
            handled = commands.len(),
            author = %event.author,
            "Received merged pull request"
        );

        let mut requests = Vec::with_capacity(commands.len());
        let mut unresolved = 0;
        let mut pr_commits = None;
        for command in commands {
            let origin = RequestOrigin {
                installation: event.installation,
                repo: event.repo.clone(),
                source_pr: pr,
                source_title: title_or_default(&event.title, pr),
                author: event.author.clone(),
                comment_id: command.comment_id,
            };
            let branch = command.command.branch.clone();
            match resolve_request(&client, origin, command, &mut pr_commits).await {
                Ok(request) => requests.push(request),
                Err(e) => {
                    error!(%branch, error = %e, "Failed to handle backport request");
                    unresolved += 1;
                }
            }
        }

        let outcome = match self.run_all(requests).await {
            IntakeOutcome::Processed { succeeded, failed } => IntakeOutcome::Processed {
                succeeded,
                failed: failed + unresolved,
            },
            other => other,
        };
        if let IntakeOutcome::Processed { failed: 0, .. } = outcome {
            remove_request_label(&client, pr).await;
        }
        Ok(outcome)
    }

    /// Queues every request, then waits for all of them.
    async fn run_all(&self, requests: Vec<BackportRequest>) -> IntakeOutcome {
        let mut handles: Vec<(String, Result<TaskHandle<R::Output, R::Error>, QueueError<R::Error>>)> =
            Vec::with_capacity(requests.len());
        for request in requests {
            let branch = request.target_branch().to_string();
            let handle = self.dispatcher.enqueue(Arc::new(request)).await;
            handles.push((branch, handle));
        }

        let mut succeeded = 0;
        let mut failed = 0;
        for (branch, handle) in handles {
            let result = match handle {
                Ok(handle) => handle.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    warn!(%branch, error = %e, "Backport did not succeed");
                    failed += 1;
                }
            }
        }
        IntakeOutcome::Processed { succeeded, failed }
    }
}

/// Errors turning a parsed command into a request.
#[derive(Debug, Error)]
enum ResolveError {
    #[error("Failed to fetch commits of the pull request: {0}")]
    Commits(#[from] GitHubApiError),

    #[error(transparent)]
    Invalid(#[from] CommandError),
}

/// Builds the request for a command, fetching the pull request's commits
/// for full requests. The commit list is fetched at most once per delivery.
async fn resolve_request<C: GitHubApi>(
    client: &C,
    origin: RequestOrigin,
    command: CommentCommand,
    pr_commits: &mut Option<Vec<Sha>>,
) -> Result<BackportRequest, ResolveError> {
    let CommentCommand { command, .. } = command;
    let commits = if command.is_full_request {
        match pr_commits {
            Some(commits) => commits.clone(),
            None => {
                let commits = client.list_pull_commits(origin.source_pr).await?;
                *pr_commits = Some(commits.clone());
                commits
            }
        }
    } else {
        command.commits
    };

    let request = BackportRequest::new(origin, command.branch, commits, command.is_full_request)
        .map_err(CommandError::from)?;
    Ok(request)
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Delivery task panicked");
    }
}

fn is_collaborator(association: &str) -> bool {
    !association.is_empty() && association != ASSOCIATION_NONE
}

/// A `/backport` comment from a collaborator that was not already rejected.
fn is_pending_command(comment: &IssueComment) -> bool {
    is_backport_command(&comment.body)
        && is_collaborator(&comment.author_association)
        && comment.confused_reactions == 0
}

fn title_or_default(title: &str, pr: PrNumber) -> String {
    if title.trim().is_empty() {
        format!("Backport of PR {}", pr)
    } else {
        title.to_string()
    }
}

async fn react<C: GitHubApi>(client: &C, comment: CommentId, reaction: Reaction) {
    if let Err(e) = client.add_reaction(comment, reaction).await {
        warn!(%comment, reaction = reaction.as_api_str(), error = %e, "Failed to add reaction");
    }
}

async fn remove_request_label<C: GitHubApi>(client: &C, pr: PrNumber) {
    if let Err(e) = client.remove_label(pr, LABEL_BACKPORT_REQUEST).await {
        warn!(%pr, error = %e, "Failed to remove backport label");
    }
}
