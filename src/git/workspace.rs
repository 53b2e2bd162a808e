//! Cached clones and per-task worktrees.
//!
//! Each repository has one long-lived clone under `cache/<owner>/<repo>`. It is
//! never checked out to a backport branch; instead every task gets its own
//! worktree under `work/backport-XXXXXX`, created from `origin/<target>` on a
//! fresh `backport/<pr>/<target>` branch and removed when the task ends.
//!
//! Callers must serialize workspace creation per repository (the task queue
//! does this), since fetches and branch deletion mutate the shared clone.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{BranchName, PrNumber, RepoId};

use super::{GitConfig, GitError, GitResult, run_git, run_git_stdout};

/// Errors from setting up a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Cloning the repository into the cache failed.
    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: GitError,
    },

    /// Refreshing the cached clone failed.
    #[error("failed to fetch: {0}")]
    Fetch(#[source] GitError),

    /// The target branch is not on the remote.
    #[error("branch `{branch}` does not exist on the remote")]
    MissingTargetBranch { branch: String },

    /// A stale local branch could not be removed.
    #[error("failed to delete existing branch `{branch}`: {source}")]
    DeleteBranch {
        branch: String,
        #[source]
        source: GitError,
    },

    /// `git worktree add` failed.
    #[error("failed to create worktree: {0}")]
    Worktree(#[source] GitError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An isolated checkout for one task.
///
/// The directory is removed when this value is dropped, so a task that bails
/// out early never leaves a worktree behind. [`TaskWorkspace::destroy`] also
/// prunes the worktree's metadata from the cached clone.
#[derive(Debug)]
pub struct TaskWorkspace {
    dir: TempDir,
    clone_dir: PathBuf,
    branch: String,
    timeout: Duration,
}

impl TaskWorkspace {
    /// Path of the worktree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The backport branch checked out in the worktree.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The cached clone this worktree belongs to.
    pub fn clone_dir(&self) -> &Path {
        &self.clone_dir
    }

    /// Removes the worktree directory, then prunes its metadata.
    ///
    /// Pruning is best-effort; the next workspace creation prunes again.
    pub fn destroy(self) -> Result<(), WorkspaceError> {
        let TaskWorkspace {
            dir,
            clone_dir,
            timeout,
            ..
        } = self;

        let path = dir.path().to_path_buf();
        dir.close()?;
        debug!(path = %path.display(), "Removed task workspace");

        if let Err(e) = run_git(&clone_dir, &["worktree", "prune"], timeout) {
            warn!(error = %e, "Failed to prune worktrees");
        }
        Ok(())
    }
}

/// Returns the cached clone of `repo`, cloning it first if needed.
///
/// An existing clone is reused as-is; it is refreshed by
/// [`create_task_workspace`].
pub fn ensure_cached_clone(config: &GitConfig, repo: &RepoId) -> Result<PathBuf, WorkspaceError> {
    let clone_dir = config.clone_dir(repo);

    if clone_dir.join(".git").exists() {
        debug!(path = %clone_dir.display(), "Reusing cached clone");
        return Ok(clone_dir);
    }

    let parent = clone_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.cache_dir());
    std::fs::create_dir_all(&parent)?;

    // Leftovers of an interrupted clone would make `git clone` refuse the path.
    if clone_dir.exists() {
        std::fs::remove_dir_all(&clone_dir)?;
    }

    let url = config.remote_url(repo);
    info!(%repo, "Cloning repository into cache");

    let target = clone_dir.to_string_lossy();
    run_git(&parent, &["clone", "-q", &url, &target], config.timeout)
        .map_err(|source| WorkspaceError::Clone { url, source })?;

    Ok(clone_dir)
}

/// Creates a worktree at `origin/<target_branch>` on a new `backport_branch`.
///
/// Fetches every remote first, and replaces a local `backport_branch` left
/// over from an earlier attempt so retries start from a clean slate.
pub fn create_task_workspace(
    config: &GitConfig,
    clone_dir: &Path,
    target_branch: &BranchName,
    backport_branch: &str,
) -> Result<TaskWorkspace, WorkspaceError> {
    let timeout = config.timeout;

    run_git(clone_dir, &["fetch", "--all", "--prune", "-q"], timeout)
        .map_err(WorkspaceError::Fetch)?;

    match default_branch(clone_dir, timeout) {
        Ok(default) => debug!(default_branch = %default, "Resolved default branch"),
        Err(e) => debug!(error = %e, "Could not resolve default branch"),
    }

    let remote_ref = format!("refs/remotes/origin/{}", target_branch);
    if !ref_exists(clone_dir, &remote_ref, timeout) {
        return Err(WorkspaceError::MissingTargetBranch {
            branch: target_branch.to_string(),
        });
    }

    // Prune before touching branches: a branch still registered to a deleted
    // worktree can't be deleted.
    if let Err(e) = run_git(clone_dir, &["worktree", "prune"], timeout) {
        warn!(error = %e, "Failed to prune worktrees");
    }

    let local_ref = format!("refs/heads/{}", backport_branch);

    // A task killed before its drop guard ran leaves its worktree on disk,
    // and prune keeps it while the directory exists.
    let orphan = worktree_holding(clone_dir, &local_ref, timeout).map_err(|source| {
        WorkspaceError::DeleteBranch {
            branch: backport_branch.to_string(),
            source,
        }
    })?;
    if let Some(orphan) = orphan {
        warn!(
            branch = backport_branch,
            path = %orphan.display(),
            "Removing orphaned worktree"
        );
        let path = orphan.to_string_lossy();
        run_git(clone_dir, &["worktree", "remove", "--force", &path], timeout).map_err(
            |source| WorkspaceError::DeleteBranch {
                branch: backport_branch.to_string(),
                source,
            },
        )?;
    }

    if ref_exists(clone_dir, &local_ref, timeout) {
        info!(branch = backport_branch, "Deleting existing local backport branch");
        run_git(clone_dir, &["branch", "-D", backport_branch], timeout).map_err(|source| {
            WorkspaceError::DeleteBranch {
                branch: backport_branch.to_string(),
                source,
            }
        })?;
    }

    let work_dir = config.work_dir();
    std::fs::create_dir_all(&work_dir)?;
    let dir = tempfile::Builder::new()
        .prefix("backport-")
        .tempdir_in(&work_dir)?;

    let start_point = format!("origin/{}", target_branch);
    let path = dir.path().to_string_lossy().into_owned();
    run_git(
        clone_dir,
        &[
            "worktree",
            "add",
            "-q",
            "-b",
            backport_branch,
            &path,
            &start_point,
        ],
        timeout,
    )
    .map_err(WorkspaceError::Worktree)?;

    info!(
        branch = backport_branch,
        target = %target_branch,
        path = %path,
        "Created task workspace"
    );

    Ok(TaskWorkspace {
        dir,
        clone_dir: clone_dir.to_path_buf(),
        branch: backport_branch.to_string(),
        timeout,
    })
}

/// Empties the task work directory.
///
/// Run at startup, before any task exists: whatever is left under `work/`
/// belongs to a previous process. Stale worktree metadata in the cached
/// clones is pruned by the next [`create_task_workspace`].
pub fn clear_work_dir(config: &GitConfig) -> Result<usize, WorkspaceError> {
    let work_dir = config.work_dir();
    if !work_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(&work_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        debug!(path = %path.display(), "Removed leftover workspace");
        removed += 1;
    }
    Ok(removed)
}

/// Fetches the head of pull request `pr` into `refs/remotes/origin/pr/<n>`.
///
/// Makes the pull request's own commits available even when it was squashed
/// or rebased on merge.
pub fn fetch_pull_ref(config: &GitConfig, clone_dir: &Path, pr: PrNumber) -> GitResult<()> {
    let refspec = format!("+refs/pull/{0}/head:refs/remotes/origin/pr/{0}", pr.0);
    run_git(clone_dir, &["fetch", "-q", "origin", &refspec], config.timeout)?;
    Ok(())
}

/// Resolves the remote's default branch from `origin/HEAD`.
pub fn default_branch(clone_dir: &Path, timeout: Duration) -> GitResult<String> {
    let full = run_git_stdout(
        clone_dir,
        &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
        timeout,
    )?;
    Ok(full
        .strip_prefix("origin/")
        .map(str::to_string)
        .unwrap_or(full))
}

/// Finds the linked worktree that has `local_ref` checked out.
fn worktree_holding(clone_dir: &Path, local_ref: &str, timeout: Duration) -> GitResult<Option<PathBuf>> {
    let list = run_git_stdout(clone_dir, &["worktree", "list", "--porcelain"], timeout)?;
    Ok(find_worktree(&list, local_ref).filter(|path| !is_same_dir(path, clone_dir)))
}

/// Parses `git worktree list --porcelain` output for the entry on `local_ref`.
fn find_worktree(porcelain: &str, local_ref: &str) -> Option<PathBuf> {
    let mut current: Option<&str> = None;
    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            current = Some(path);
        } else if line.is_empty() {
            current = None;
        } else if line.strip_prefix("branch ") == Some(local_ref) {
            return current.map(PathBuf::from);
        }
    }
    None
}

fn is_same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn ref_exists(workdir: &Path, reference: &str, timeout: Duration) -> bool {
    run_git(
        workdir,
        &["show-ref", "--verify", "--quiet", reference],
        timeout,
    )
    .is_ok()
}
