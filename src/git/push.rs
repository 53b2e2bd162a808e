//! Pushing the backport branch.
//!
//! The branch is force-pushed to an authenticated URL given on the command
//! line, so the installation token never lands in the cached clone's config.
//! Errors are scrubbed of the token before they leave this module: they end
//! up in logs and in the failure comment on the pull request.

use std::path::Path;

use tracing::info;

use crate::types::RepoId;

use super::{GitConfig, GitError, GitResult, git_command, output_with_timeout};

const REDACTED: &str = "***";

/// Force-pushes HEAD of `worktree` to `refs/heads/<branch>` on the remote.
pub fn force_push_branch(
    config: &GitConfig,
    worktree: &Path,
    repo: &RepoId,
    branch: &str,
    token: &str,
) -> GitResult<()> {
    let url = config.push_url(repo, token);
    let refspec = format!("HEAD:refs/heads/{}", branch);
    let args = ["push", "--force", "-q", url.as_str(), refspec.as_str()];

    let output = output_with_timeout(git_command(worktree), &args, config.timeout)
        .map_err(|e| redact_error(e, token))?;

    if !output.status.success() {
        let error = GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        return Err(redact_error(error, token));
    }

    info!(%repo, branch, "Pushed backport branch");
    Ok(())
}

fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        text.to_string()
    } else {
        text.replace(token, REDACTED)
    }
}

fn redact_error(error: GitError, token: &str) -> GitError {
    match error {
        GitError::CommandFailed { command, stderr } => GitError::CommandFailed {
            command: redact(&command, token),
            stderr: redact(&stderr, token),
        },
        GitError::TimedOut { command, timeout } => GitError::TimedOut {
            command: redact(&command, token),
            timeout,
        },
        other => other,
    }
}
