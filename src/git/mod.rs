//! Local git operations for backports.
//!
//! This module implements the git side of a backport:
//! - Workspace management (cached clone per repository, one worktree per task)
//! - Cherry-picking with a conflict-favoring fallback
//! - Inspection of the result (diffs, empty commits, `[skip ci]` markers)
//! - Force-pushing the backport branch
//!
//! Every git invocation runs with system/user config disabled, terminal
//! prompts off, and a wall-clock timeout after which the process is killed.
//! All functions here are blocking; async callers run them on the blocking
//! thread pool.

pub mod cherry_pick;
pub mod inspect;
pub mod push;
pub mod workspace;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::types::{RepoId, Sha};

/// Default bound on a single git invocation.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Commit message marker that tells CI not to run.
pub const SKIP_CI_MARKER: &str = "[skip ci]";

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Git command did not finish in time and was killed.
    #[error("git command timed out after {timeout:?}: {command}")]
    TimedOut { command: String, timeout: Duration },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for creating commits.
///
/// This is passed via `-c` flags to git commands, ensuring commits can be
/// created even when global/system git config is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer name (git `user.name`).
    pub name: String,

    /// The committer email (git `user.email`).
    pub email: String,
}

impl CommitIdentity {
    /// The identity GitHub shows for an app: `<name>[bot]`.
    pub fn for_app(app_name: &str) -> Self {
        CommitIdentity {
            name: format!("{}[bot]", app_name),
            email: format!("{}[bot]@users.noreply.github.com", app_name),
        }
    }
}

/// Configuration for git operations.
#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Root directory; cached clones live in `cache/`, task worktrees in `work/`.
    pub root_dir: PathBuf,

    /// Base URL repositories are cloned from, e.g. `https://github.com`.
    ///
    /// Tests point this at a local directory holding `<owner>/<repo>` bare repos.
    pub remote_base: String,

    /// Identity for commits created by cherry-picks and amendments.
    pub commit_identity: CommitIdentity,

    /// Bound on each git invocation.
    pub timeout: Duration,
}

impl GitConfig {
    /// Returns the directory holding all cached clones.
    pub fn cache_dir(&self) -> PathBuf {
        self.root_dir.join("cache")
    }

    /// Returns the directory holding per-task worktrees.
    pub fn work_dir(&self) -> PathBuf {
        self.root_dir.join("work")
    }

    /// Returns the cached clone path: `cache/<owner>/<repo>`.
    pub fn clone_dir(&self, repo: &RepoId) -> PathBuf {
        self.cache_dir().join(&repo.owner).join(&repo.repo)
    }

    /// Returns the anonymous clone URL of a repository.
    pub fn remote_url(&self, repo: &RepoId) -> String {
        format!(
            "{}/{}/{}",
            self.remote_base.trim_end_matches('/'),
            repo.owner,
            repo.repo
        )
    }

    /// Returns the URL used for pushing with an installation token.
    ///
    /// For `https://` remotes the token is embedded as
    /// `https://x-access-token:<token>@host/<owner>/<repo>.git`. Other remotes
    /// (local paths in tests) are returned unchanged.
    pub fn push_url(&self, repo: &RepoId, token: &str) -> String {
        let url = self.remote_url(repo);
        match url.strip_prefix("https://") {
            Some(rest) => format!("https://x-access-token:{}@{}.git", token, rest),
            None => url,
        }
    }
}

/// Create a git Command with clean environment (no system/user config).
///
/// This ensures consistent behavior across different machines by ignoring
/// system and user git configuration (e.g., rerere, hooks, aliases).
pub(crate) fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Create a git Command configured for commit operations.
///
/// Prepends `-c user.name=<name> -c user.email=<email> -c commit.gpgsign=false`
/// so no persistent `.git/config` changes are required.
pub(crate) fn git_commit_command(workdir: &Path, identity: &CommitIdentity) -> Command {
    let mut cmd = git_command(workdir);

    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));
    cmd.arg("-c");
    cmd.arg("commit.gpgsign=false");

    cmd
}

/// Runs a prepared command, killing it if it exceeds `timeout`.
///
/// Returns the output whatever the exit status; callers decide what a
/// non-zero exit means.
pub(crate) fn output_with_timeout(
    mut cmd: Command,
    args: &[&str],
    timeout: Duration,
) -> GitResult<Output> {
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    // Drain both pipes concurrently so a chatty command can't fill a pipe
    // buffer and block before exiting.
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GitError::TimedOut {
                command: format!("git {}", args.join(" ")),
                timeout,
            });
        }
    };

    Ok(Output {
        status,
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn check_status(output: Output, args: &[&str]) -> GitResult<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(GitError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a git command with the given timeout, failing on non-zero exit.
pub fn run_git(workdir: &Path, args: &[&str], timeout: Duration) -> GitResult<Output> {
    let output = output_with_timeout(git_command(workdir), args, timeout)?;
    check_status(output, args)
}

/// Run a commit-creating git command with the given identity and timeout.
pub fn run_git_commit(
    workdir: &Path,
    identity: &CommitIdentity,
    args: &[&str],
    timeout: Duration,
) -> GitResult<Output> {
    let output = output_with_timeout(git_commit_command(workdir, identity), args, timeout)?;
    check_status(output, args)
}

/// Run a git command with the default timeout.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    run_git(workdir, args, DEFAULT_GIT_TIMEOUT)
}

/// Run a git command and return trimmed stdout.
pub fn run_git_stdout(workdir: &Path, args: &[&str], timeout: Duration) -> GitResult<String> {
    let output = run_git(workdir, args, timeout)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Get the SHA of a revision.
pub fn rev_parse(workdir: &Path, rev: &str, timeout: Duration) -> GitResult<Sha> {
    run_git_stdout(workdir, &["rev-parse", rev], timeout).map(Sha::new)
}

#[cfg(test)]
pub(crate) mod test_support;
