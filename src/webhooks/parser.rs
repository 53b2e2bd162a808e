//! GitHub webhook payload parser.
//!
//! Turns raw delivery JSON into typed [`GitHubEvent`] values.
//!
//! 1. The event type comes from the `X-GitHub-Event` header
//! 2. Known event types are parsed into their typed form
//! 3. Unknown event types and irrelevant actions return `Ok(None)`
//! 4. Malformed payloads return `Err`
//!
//! Unknown fields are ignored throughout.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{CommentId, InstallationId, PrNumber, RepoId};

use super::events::{CommentAction, GitHubEvent, IssueCommentEvent, PrAction, PullRequestEvent};

#[derive(Debug, Error)]
pub enum ParseError {
    /// Deserialization failed, including missing required fields.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed event.
///
/// Returns `Ok(None)` for deliveries the bot does not handle.
///
/// # Examples
///
/// ```
/// use backport_bot::webhooks::{GitHubEvent, parse_webhook};
///
/// let payload = br#"{
///     "action": "created",
///     "installation": { "id": 1 },
///     "comment": {
///         "id": 123,
///         "body": "/backport to stable28",
///         "author_association": "MEMBER",
///         "user": { "login": "octocat" }
///     },
///     "issue": {
///         "number": 42,
///         "title": "Fix upload",
///         "state": "closed",
///         "user": { "login": "alice" },
///         "pull_request": { "merged_at": "2024-01-01T00:00:00Z" }
///     },
///     "repository": {
///         "owner": { "login": "nextcloud" },
///         "name": "server"
///     }
/// }"#;
///
/// let Some(GitHubEvent::IssueComment(event)) = parse_webhook("issue_comment", payload).unwrap()
/// else {
///     panic!("expected an issue comment");
/// };
/// assert!(event.pr_merged);
///
/// assert!(parse_webhook("star", b"{}").unwrap().is_none());
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<GitHubEvent>, ParseError> {
    match event_type {
        "issue_comment" => parse_issue_comment(payload).map(|e| Some(GitHubEvent::IssueComment(e))),
        "pull_request" => parse_pull_request(payload).map(|opt| opt.map(GitHubEvent::PullRequest)),
        _ => Ok(None),
    }
}

// ============================================================================
// Shared payload pieces
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawUser,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: u64,
}

impl RawRepository {
    fn into_repo_id(self) -> RepoId {
        RepoId::new(self.owner.login, self.name)
    }
}

// ============================================================================
// issue_comment event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawIssueCommentPayload {
    action: String,
    installation: RawInstallation,
    comment: RawComment,
    issue: RawIssue,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    body: Option<String>,
    user: RawUser,
    #[serde(default)]
    author_association: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    user: RawUser,
    // Present only when the issue is a pull request.
    pull_request: Option<RawIssuePullRequest>,
}

#[derive(Debug, Deserialize)]
struct RawIssuePullRequest {
    #[serde(default)]
    merged_at: Option<String>,
}

fn parse_issue_comment(payload: &[u8]) -> Result<IssueCommentEvent, ParseError> {
    let raw: RawIssueCommentPayload = serde_json::from_slice(payload)?;

    let action = match raw.action.as_str() {
        "created" => CommentAction::Created,
        "edited" => CommentAction::Edited,
        "deleted" => CommentAction::Deleted,
        other => {
            return Err(ParseError::InvalidField {
                field: "action",
                value: other.to_string(),
            });
        }
    };

    let pr_number = raw
        .issue
        .pull_request
        .as_ref()
        .map(|_| PrNumber(raw.issue.number));
    let pr_merged = raw
        .issue
        .pull_request
        .as_ref()
        .is_some_and(|pr| pr.merged_at.is_some());

    Ok(IssueCommentEvent {
        installation: InstallationId(raw.installation.id),
        repo: raw.repository.into_repo_id(),
        action,
        pr_number,
        pr_title: raw.issue.title,
        pr_author: raw.issue.user.login,
        pr_closed: raw.issue.state == "closed",
        pr_merged,
        comment_id: CommentId(raw.comment.id),
        body: raw.comment.body.unwrap_or_default(),
        comment_author: raw.comment.user.login,
        author_association: raw.comment.author_association.unwrap_or_default(),
    })
}

// ============================================================================
// pull_request event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    installation: RawInstallation,
    pull_request: RawPullRequest,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    user: RawUser,
    merged: Option<bool>,
    merged_at: Option<String>,
}

fn parse_pull_request(payload: &[u8]) -> Result<Option<PullRequestEvent>, ParseError> {
    let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;

    let action = match raw.action.as_str() {
        "opened" => PrAction::Opened,
        "closed" => PrAction::Closed,
        "reopened" => PrAction::Reopened,
        "edited" => PrAction::Edited,
        "synchronize" => PrAction::Synchronize,
        // labeled, assigned, review_requested, ...
        _ => return Ok(None),
    };

    let pr = raw.pull_request;
    Ok(Some(PullRequestEvent {
        installation: InstallationId(raw.installation.id),
        repo: raw.repository.into_repo_id(),
        action,
        pr_number: PrNumber(pr.number),
        title: pr.title,
        author: pr.user.login,
        merged: pr.merged.unwrap_or(false) || pr.merged_at.is_some(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_comment_payload(state: &str, pull_request: serde_json::Value) -> Vec<u8> {
        let mut issue = json!({
            "number": 42,
            "title": "Fix upload of large files",
            "state": state,
            "user": { "login": "alice", "id": 1 },
        });
        if !pull_request.is_null() {
            issue["pull_request"] = pull_request;
        }
        serde_json::to_vec(&json!({
            "action": "created",
            "installation": { "id": 77 },
            "comment": {
                "id": 12345,
                "body": "/backport to stable28",
                "author_association": "MEMBER",
                "user": { "login": "bob", "id": 2 }
            },
            "issue": issue,
            "repository": {
                "owner": { "login": "nextcloud" },
                "name": "server",
                "full_name": "nextcloud/server"
            },
            "sender": { "login": "bob" }
        }))
        .unwrap()
    }

    fn expect_comment(payload: &[u8]) -> IssueCommentEvent {
        match parse_webhook("issue_comment", payload).unwrap() {
            Some(GitHubEvent::IssueComment(e)) => e,
            other => panic!("expected IssueComment, got {other:?}"),
        }
    }

    #[test]
    fn parses_comment_on_merged_pull_request() {
        let payload = issue_comment_payload(
            "closed",
            json!({ "url": "https://api.github.com/...", "merged_at": "2024-02-01T10:00:00Z" }),
        );
        let event = expect_comment(&payload);

        assert_eq!(event.installation, InstallationId(77));
        assert_eq!(event.repo, RepoId::new("nextcloud", "server"));
        assert_eq!(event.action, CommentAction::Created);
        assert_eq!(event.pr_number, Some(PrNumber(42)));
        assert_eq!(event.pr_title, "Fix upload of large files");
        assert_eq!(event.pr_author, "alice");
        assert!(event.pr_closed);
        assert!(event.pr_merged);
        assert_eq!(event.comment_id, CommentId(12345));
        assert_eq!(event.body, "/backport to stable28");
        assert_eq!(event.comment_author, "bob");
        assert_eq!(event.author_association, "MEMBER");
    }

    #[test]
    fn null_merged_at_means_not_merged() {
        let payload = issue_comment_payload("open", json!({ "merged_at": null }));
        let event = expect_comment(&payload);
        assert!(!event.pr_closed);
        assert!(!event.pr_merged);
        assert_eq!(event.pr_number, Some(PrNumber(42)));

        let payload = issue_comment_payload("closed", json!({ "merged_at": null }));
        assert!(expect_comment(&payload).is_closed_unmerged());
    }

    #[test]
    fn comment_on_plain_issue_has_no_pr_number() {
        let payload = issue_comment_payload("open", serde_json::Value::Null);
        let event = expect_comment(&payload);
        assert_eq!(event.pr_number, None);
        assert!(!event.pr_merged);
    }

    #[test]
    fn deleted_comment_has_empty_body() {
        let payload = json!({
            "action": "deleted",
            "installation": { "id": 1 },
            "comment": { "id": 9, "user": { "login": "bob" } },
            "issue": { "number": 3, "user": { "login": "alice" }, "pull_request": {} },
            "repository": { "owner": { "login": "o" }, "name": "r" }
        });
        let event = expect_comment(&serde_json::to_vec(&payload).unwrap());
        assert_eq!(event.action, CommentAction::Deleted);
        assert_eq!(event.body, "");
        assert_eq!(event.author_association, "");
    }

    #[test]
    fn unknown_comment_action_is_an_error() {
        let payload = json!({
            "action": "pinned",
            "installation": { "id": 1 },
            "comment": { "id": 9, "user": { "login": "bob" } },
            "issue": { "number": 3, "user": { "login": "alice" } },
            "repository": { "owner": { "login": "o" }, "name": "r" }
        });
        let err = parse_webhook("issue_comment", &serde_json::to_vec(&payload).unwrap())
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "action", .. }));
    }

    #[test]
    fn missing_installation_is_an_error() {
        let payload = json!({
            "action": "created",
            "comment": { "id": 9, "body": "/backport to stable28", "user": { "login": "bob" } },
            "issue": { "number": 3, "user": { "login": "alice" }, "pull_request": {} },
            "repository": { "owner": { "login": "o" }, "name": "r" }
        });
        let err = parse_webhook("issue_comment", &serde_json::to_vec(&payload).unwrap())
            .unwrap_err();
        assert!(matches!(err, ParseError::JsonError(_)));
    }

    fn pull_request_payload(action: &str, merged: bool) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": action,
            "number": 42,
            "installation": { "id": 77 },
            "pull_request": {
                "number": 42,
                "title": "Fix upload of large files",
                "state": "closed",
                "merged": merged,
                "merged_at": if merged { json!("2024-02-01T10:00:00Z") } else { json!(null) },
                "user": { "login": "alice" },
                "head": { "ref": "fix/upload", "sha": "abc" },
                "base": { "ref": "master", "sha": "def" }
            },
            "repository": { "owner": { "login": "nextcloud" }, "name": "server" }
        }))
        .unwrap()
    }

    #[test]
    fn parses_merged_pull_request() {
        let event = match parse_webhook("pull_request", &pull_request_payload("closed", true)) {
            Ok(Some(GitHubEvent::PullRequest(e))) => e,
            other => panic!("expected PullRequest, got {other:?}"),
        };
        assert_eq!(event.installation, InstallationId(77));
        assert_eq!(event.action, PrAction::Closed);
        assert_eq!(event.pr_number, PrNumber(42));
        assert_eq!(event.title, "Fix upload of large files");
        assert_eq!(event.author, "alice");
        assert!(event.is_merge());
    }

    #[test]
    fn closed_without_merge_is_not_a_merge() {
        let Ok(Some(GitHubEvent::PullRequest(event))) =
            parse_webhook("pull_request", &pull_request_payload("closed", false))
        else {
            panic!("expected PullRequest");
        };
        assert!(!event.is_merge());
    }

    #[test]
    fn irrelevant_pull_request_actions_are_ignored() {
        for action in ["labeled", "assigned", "review_requested", "auto_merge_enabled"] {
            assert!(
                parse_webhook("pull_request", &pull_request_payload(action, false))
                    .unwrap()
                    .is_none(),
                "{action} should be ignored"
            );
        }
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        for event_type in ["push", "check_suite", "ping", "installation"] {
            assert!(parse_webhook(event_type, b"{}").unwrap().is_none());
        }
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_webhook("pull_request", b"{not json"),
            Err(ParseError::JsonError(_))
        ));
    }
}
