//! [`GitHubApi`] over the REST API via octocrab.
//!
//! Requests go through octocrab's raw `get`/`post`/`patch`/`delete` with
//! small serde structs for the fields we read, and are retried on transient
//! failures.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::matcher::Milestone;
use crate::reconcile::DiffStats;
use crate::types::{CommentId, PrNumber, Sha};

use super::api::{GitHubApi, IssueComment, NewPullRequest, PullRequestInfo, Reaction, Review};
use super::client::OctocrabClient;
use super::error::GitHubApiError;
use super::retry::{retry_create_with_backoff, retry_with_backoff};

const PAGE_SIZE: usize = 100;

// ─── Response Types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawPull {
    number: u64,
    title: String,
    user: Option<RawUser>,
    state: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
}

impl From<RawPull> for PullRequestInfo {
    fn from(raw: RawPull) -> Self {
        PullRequestInfo {
            number: PrNumber(raw.number),
            title: raw.title,
            author: raw.user.map(|u| u.login).unwrap_or_default(),
            closed: raw.state == "closed",
            merged: raw.merged.unwrap_or(false) || raw.merged_at.is_some(),
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            stats: DiffStats {
                additions: raw.additions,
                deletions: raw.deletions,
                changed_files: raw.changed_files,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    user: Option<RawUser>,
    state: String,
    author_association: String,
}

#[derive(Debug, Deserialize)]
struct RawMilestone {
    number: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct RawReactionRollup {
    #[serde(default)]
    confused: u64,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    body: Option<String>,
    user: Option<RawUser>,
    author_association: String,
    reactions: Option<RawReactionRollup>,
}

impl From<RawComment> for IssueComment {
    fn from(raw: RawComment) -> Self {
        IssueComment {
            id: CommentId(raw.id),
            body: raw.body.unwrap_or_default(),
            author: raw.user.map(|u| u.login).unwrap_or_default(),
            author_association: raw.author_association,
            confused_reactions: raw.reactions.map(|r| r.confused).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedPull {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedComment {
    id: u64,
}

// ─── Request Bodies ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ReviewersRequest<'a> {
    reviewers: &'a [String],
}

#[derive(Serialize)]
struct BodyRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct MilestoneRequest {
    milestone: u64,
}

#[derive(Serialize)]
struct LabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Serialize)]
struct AssigneesRequest<'a> {
    assignees: &'a [String],
}

#[derive(Serialize)]
struct ReactionRequest {
    content: &'static str,
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn paged_route(route: &str, page: u32) -> String {
    let separator = if route.contains('?') { '&' } else { '?' };
    format!("{}{}per_page={}&page={}", route, separator, PAGE_SIZE, page)
}

impl OctocrabClient {
    async fn get_json<T: DeserializeOwned>(&self, route: &str) -> Result<T, GitHubApiError> {
        self.inner()
            .get(route, None::<&()>)
            .await
            .map_err(GitHubApiError::from_octocrab)
    }

    /// Fetches every page of a list endpoint.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        route: &str,
    ) -> Result<Vec<T>, GitHubApiError> {
        let mut page = 1u32;
        let mut all = Vec::new();

        loop {
            let items: Vec<T> = self.get_json(&paged_route(route, page)).await?;
            let is_last_page = items.len() < PAGE_SIZE;
            all.extend(items);

            if is_last_page {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, GitHubApiError> {
        self.inner()
            .post(route, Some(body))
            .await
            .map_err(GitHubApiError::from_octocrab)
    }

    async fn patch_json<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<(), GitHubApiError> {
        let _: serde_json::Value = self
            .inner()
            .patch(route, Some(body))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(())
    }
}

// ─── Trait Implementation ─────────────────────────────────────────────────────

impl GitHubApi for OctocrabClient {
    async fn get_pull_request(&self, pr: PrNumber) -> Result<PullRequestInfo, GitHubApiError> {
        let route = self.repo_route(&format!("pulls/{}", pr.0));
        retry_with_backoff(self.retry_config(), "get_pull_request", || async {
            self.get_json::<RawPull>(&route).await.map(PullRequestInfo::from)
        })
        .await
    }

    async fn list_pull_commits(&self, pr: PrNumber) -> Result<Vec<Sha>, GitHubApiError> {
        let route = self.repo_route(&format!("pulls/{}/commits", pr.0));
        retry_with_backoff(self.retry_config(), "list_pull_commits", || async {
            let commits: Vec<RawCommit> = self.get_all_pages(&route).await?;
            Ok(commits.into_iter().map(|c| Sha::new(c.sha)).collect())
        })
        .await
    }

    async fn list_reviews(&self, pr: PrNumber) -> Result<Vec<Review>, GitHubApiError> {
        let route = self.repo_route(&format!("pulls/{}/reviews", pr.0));
        retry_with_backoff(self.retry_config(), "list_reviews", || async {
            let reviews: Vec<RawReview> = self.get_all_pages(&route).await?;
            Ok(reviews
                .into_iter()
                .map(|r| Review {
                    reviewer: r.user.map(|u| u.login),
                    state: r.state,
                    author_association: r.author_association,
                })
                .collect())
        })
        .await
    }

    async fn request_reviewers(
        &self,
        pr: PrNumber,
        reviewers: &[String],
    ) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!("pulls/{}/requested_reviewers", pr.0));
        retry_with_backoff(self.retry_config(), "request_reviewers", || async {
            let _: serde_json::Value = self
                .post_json(&route, &ReviewersRequest { reviewers })
                .await?;
            Ok(())
        })
        .await
    }

    async fn create_pull_request(
        &self,
        request: &NewPullRequest,
    ) -> Result<PrNumber, GitHubApiError> {
        let route = self.repo_route("pulls");
        let existing_route = self.repo_route(&format!(
            "pulls?state=open&head={}&base={}",
            urlencoding::encode(&format!("{}:{}", self.repo().owner, request.head)),
            urlencoding::encode(&request.base),
        ));
        retry_create_with_backoff(
            self.retry_config(),
            "create_pull_request",
            || async {
                let created: CreatedPull = self.post_json(&route, request).await?;
                Ok(PrNumber(created.number))
            },
            || async {
                let open: Vec<CreatedPull> = self.get_json(&existing_route).await?;
                Ok(open.first().map(|pull| PrNumber(pull.number)))
            },
        )
        .await
    }

    async fn update_pull_request_body(
        &self,
        pr: PrNumber,
        body: &str,
    ) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!("pulls/{}", pr.0));
        retry_with_backoff(self.retry_config(), "update_pull_request_body", || async {
            self.patch_json(&route, &BodyRequest { body }).await
        })
        .await
    }

    async fn list_milestones(&self) -> Result<Vec<Milestone>, GitHubApiError> {
        let route = self.repo_route("milestones?state=open");
        retry_with_backoff(self.retry_config(), "list_milestones", || async {
            let milestones: Vec<RawMilestone> = self.get_all_pages(&route).await?;
            Ok(milestones
                .into_iter()
                .map(|m| Milestone {
                    number: m.number,
                    title: m.title,
                })
                .collect())
        })
        .await
    }

    async fn set_milestone(&self, pr: PrNumber, milestone: u64) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!("issues/{}", pr.0));
        retry_with_backoff(self.retry_config(), "set_milestone", || async {
            self.patch_json(&route, &MilestoneRequest { milestone }).await
        })
        .await
    }

    async fn list_repo_labels(&self) -> Result<Vec<String>, GitHubApiError> {
        let route = self.repo_route("labels");
        retry_with_backoff(self.retry_config(), "list_repo_labels", || async {
            let labels: Vec<RawLabel> = self.get_all_pages(&route).await?;
            Ok(labels.into_iter().map(|l| l.name).collect())
        })
        .await
    }

    async fn add_labels(&self, pr: PrNumber, labels: &[String]) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!("issues/{}/labels", pr.0));
        retry_with_backoff(self.retry_config(), "add_labels", || async {
            let _: serde_json::Value = self.post_json(&route, &LabelsRequest { labels }).await?;
            Ok(())
        })
        .await
    }

    async fn remove_label(&self, pr: PrNumber, label: &str) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!(
            "issues/{}/labels/{}",
            pr.0,
            urlencoding::encode(label)
        ));
        retry_with_backoff(self.retry_config(), "remove_label", || async {
            let _: serde_json::Value = self
                .inner()
                .delete(&route, None::<&()>)
                .await
                .map_err(GitHubApiError::from_octocrab)?;
            Ok(())
        })
        .await
    }

    async fn add_assignees(
        &self,
        pr: PrNumber,
        assignees: &[String],
    ) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!("issues/{}/assignees", pr.0));
        retry_with_backoff(self.retry_config(), "add_assignees", || async {
            let _: serde_json::Value = self
                .post_json(&route, &AssigneesRequest { assignees })
                .await?;
            Ok(())
        })
        .await
    }

    async fn create_comment(&self, pr: PrNumber, body: &str) -> Result<CommentId, GitHubApiError> {
        let route = self.repo_route(&format!("issues/{}/comments", pr.0));
        retry_with_backoff(self.retry_config(), "create_comment", || async {
            let created: CreatedComment = self.post_json(&route, &BodyRequest { body }).await?;
            Ok(CommentId(created.id))
        })
        .await
    }

    async fn list_comments(&self, pr: PrNumber) -> Result<Vec<IssueComment>, GitHubApiError> {
        let route = self.repo_route(&format!("issues/{}/comments", pr.0));
        retry_with_backoff(self.retry_config(), "list_comments", || async {
            let comments: Vec<RawComment> = self.get_all_pages(&route).await?;
            Ok(comments.into_iter().map(IssueComment::from).collect())
        })
        .await
    }

    async fn add_reaction(
        &self,
        comment: CommentId,
        reaction: Reaction,
    ) -> Result<(), GitHubApiError> {
        let route = self.repo_route(&format!("issues/comments/{}/reactions", comment.0));
        retry_with_backoff(self.retry_config(), "add_reaction", || async {
            let _: serde_json::Value = self
                .post_json(
                    &route,
                    &ReactionRequest {
                        content: reaction.as_api_str(),
                    },
                )
                .await?;
            Ok(())
        })
        .await
    }
}
