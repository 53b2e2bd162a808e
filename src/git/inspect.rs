//! Read-only checks on the backport branch.

use std::path::Path;

use crate::types::Sha;

use super::{GitConfig, GitResult, SKIP_CI_MARKER, run_git_stdout};

/// Whether `head` changes anything relative to `base`.
pub fn has_diff(config: &GitConfig, worktree: &Path, base: &str, head: &str) -> GitResult<bool> {
    let stat = run_git_stdout(worktree, &["diff", "--stat", base, head], config.timeout)?;
    Ok(!stat.is_empty())
}

/// Whether any of the last `count` commits on HEAD is empty.
///
/// Only commits that exist are checked; a root commit never counts as empty.
pub fn has_empty_commits(config: &GitConfig, worktree: &Path, count: usize) -> GitResult<bool> {
    for commit in recent_commits(config, worktree, count)? {
        let parent = format!("{}^", commit);
        if run_git_stdout(worktree, &["rev-parse", "--verify", "-q", &parent], config.timeout)
            .is_err()
        {
            continue;
        }
        if !has_diff(config, worktree, &parent, commit.as_str())? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether any of the last `count` commit messages on HEAD contains `[skip ci]`.
pub fn has_skip_ci_commits(config: &GitConfig, worktree: &Path, count: usize) -> GitResult<bool> {
    if count == 0 {
        return Ok(false);
    }
    let messages = run_git_stdout(
        worktree,
        &["log", "--format=%B", "-n", &count.to_string(), "HEAD"],
        config.timeout,
    )?;
    Ok(messages.contains(SKIP_CI_MARKER))
}

/// The subject line of `commit`, or `None` if it is blank.
pub fn commit_title(config: &GitConfig, worktree: &Path, commit: &Sha) -> GitResult<Option<String>> {
    let subject = run_git_stdout(
        worktree,
        &["log", "--format=%s", "-n", "1", commit.as_str()],
        config.timeout,
    )?;
    Ok(Some(subject).filter(|s| !s.is_empty()))
}

fn recent_commits(config: &GitConfig, worktree: &Path, count: usize) -> GitResult<Vec<Sha>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let list = run_git_stdout(
        worktree,
        &["rev-list", "-n", &count.to_string(), "HEAD"],
        config.timeout,
    )?;
    Ok(list.lines().map(Sha::new).collect())
}
